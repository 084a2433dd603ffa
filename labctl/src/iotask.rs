//! Single-owner I/O task.
//!
//! Each hardware resource is owned by exactly one spawned task; callers hold
//! a cheaply clonable [`IoTask`] handle and exchange request/response pairs
//! with it over channels. This serializes all access to the resource without
//! any locking in the request path.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task;

use crate::Error;

#[async_trait]
pub trait IoHandler: Send {
    type Request: 'static + Send;
    type Response: 'static + Send;

    async fn handle(&mut self, req: Self::Request) -> crate::Result<Self::Response>;
}

enum Msg<T: IoHandler> {
    Request {
        req: T::Request,
        answer: oneshot::Sender<crate::Result<T::Response>>,
    },
    Drop,
}

pub struct IoTask<T: IoHandler> {
    tx: mpsc::UnboundedSender<Msg<T>>,
}

impl<T: IoHandler> Clone for IoTask<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T: 'static + IoHandler> IoTask<T> {
    pub fn spawn(mut handler: T) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Msg<T>>();
        task::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    Msg::Request { req, answer } => {
                        let result = handler.handle(req).await;
                        let _ = answer.send(result);
                    }
                    Msg::Drop => break,
                }
            }
        });
        IoTask { tx }
    }

    /// Ask the task to shut down. Idempotent; pending requests are answered
    /// first because the channel drains in order.
    pub fn disconnect(&mut self) {
        let _ = self.tx.send(Msg::Drop);
    }

    pub async fn request(&mut self, req: T::Request) -> crate::Result<T::Response> {
        let (tx, rx) = oneshot::channel();
        let msg = Msg::Request { req, answer: tx };
        self.tx.send(msg).map_err(|_| Error::Disconnected)?;
        rx.await.map_err(|_| Error::Disconnected)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    #[async_trait]
    impl IoHandler for Doubler {
        type Request = u32;
        type Response = u32;

        async fn handle(&mut self, req: u32) -> crate::Result<u32> {
            Ok(req * 2)
        }
    }

    #[tokio::test]
    async fn request_reply() {
        let mut task = IoTask::spawn(Doubler);
        assert_eq!(task.request(21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn disconnected_after_drop() {
        let mut task = IoTask::spawn(Doubler);
        task.disconnect();
        // the task drains in order, so a later request fails
        let mut task2 = task.clone();
        let err = loop {
            match task2.request(1).await {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, Error::Disconnected));
    }
}
