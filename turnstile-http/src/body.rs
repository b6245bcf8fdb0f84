//! Streaming response body over the relay's frame slot.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use http_body_util::StreamBody;
use pin_project::pin_project;
use tokio::sync::watch;

use crate::relay::RelayFrame;

const HEARTBEAT: Bytes = Bytes::from_static(b"\n");

enum WriterState {
    Streaming(watch::Receiver<RelayFrame>),
    Finished,
}

/// Long-poll response body: zero or more newline heartbeats followed by
/// exactly one JSON document.
///
/// Consumers that treat the intermediate newlines as JSON whitespace parse
/// the stream as a single document with no additional framing.
///
/// Dropping the body (which hyper does when the client disconnects) drops
/// the relay receiver, which in turn closes the input handle and cancels the
/// pending query.
#[pin_project]
pub struct LongPollBody {
    #[pin]
    inner: StreamBody<BoxStream<'static, Result<Frame<Bytes>, Infallible>>>,
}

impl LongPollBody {
    /// Adapts a relay frame receiver into a response body.
    pub fn new(frames: watch::Receiver<RelayFrame>) -> Self {
        let stream = stream::unfold(WriterState::Streaming(frames), |state| async move {
            match state {
                WriterState::Streaming(mut frames) => loop {
                    if frames.changed().await.is_err() {
                        // Relay exited without a terminal frame.
                        return None;
                    }
                    let frame = frames.borrow_and_update().clone();
                    match frame {
                        RelayFrame::Idle => continue,
                        RelayFrame::Heartbeat => {
                            return Some((
                                Ok(Frame::data(HEARTBEAT)),
                                WriterState::Streaming(frames),
                            ));
                        }
                        RelayFrame::Terminal(document) => {
                            return Some((Ok(Frame::data(document)), WriterState::Finished));
                        }
                    }
                },
                WriterState::Finished => None,
            }
        });
        Self {
            inner: StreamBody::new(stream.boxed()),
        }
    }
}

impl Body for LongPollBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.project().inner.poll_frame(cx)
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl std::fmt::Debug for LongPollBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LongPollBody").field(&"...").finish()
    }
}
