//! # Downstream Streams
//!
//! Results (and forwarded evidences) leave the service over long-lived
//! streams. A [`LazyStream`] connects on first use, keeps the stream open
//! for later sends, and drops it after a failed send so the next send
//! re-establishes it. Delivery is at-least-once from the receiver's point
//! of view; nothing is deduplicated here.
//!
//! [`ChannelConnector`] is an in-process stream backed by a bounded
//! `tokio::sync::mpsc` channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::SinkError;

/// The sending half of an established stream.
#[async_trait]
pub trait StreamSender<T: Send + 'static>: Send {
    /// Send one item.
    async fn send(&mut self, item: T) -> Result<(), SinkError>;
}

/// Establishes streams.
#[async_trait]
pub trait StreamConnector<T: Send + 'static>: Send + Sync {
    /// Open a new stream.
    async fn connect(&self) -> Result<Box<dyn StreamSender<T>>, SinkError>;
}

/// A stream established on first use and re-established after failure.
pub struct LazyStream<T: Send + 'static> {
    name: String,
    connector: Arc<dyn StreamConnector<T>>,
    stream: Mutex<Option<Box<dyn StreamSender<T>>>>,
}

impl<T: Send + 'static> std::fmt::Debug for LazyStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyStream")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> LazyStream<T> {
    /// Wrap a connector. Nothing is connected until the first send.
    pub fn new(name: impl Into<String>, connector: Arc<dyn StreamConnector<T>>) -> Self {
        Self {
            name: name.into(),
            connector,
            stream: Mutex::new(None),
        }
    }

    /// Stream name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one item, connecting first if needed.
    pub async fn send(&self, item: T) -> Result<(), SinkError> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            tracing::info!(stream = %self.name, "establishing stream");
            *guard = Some(self.connector.connect().await?);
        }
        let result = match guard.as_mut() {
            Some(stream) => stream.send(item).await,
            None => Err(SinkError::Closed {
                stream: self.name.clone(),
            }),
        };
        if let Err(e) = &result {
            tracing::warn!(stream = %self.name, error = %e, "send failed; dropping stream");
            *guard = None;
        }
        result
    }

    /// Whether a stream is currently established.
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }
}

// ---------------------------------------------------------------------------
// In-process channel stream
// ---------------------------------------------------------------------------

/// Connector handing out senders of one bounded channel.
#[derive(Debug)]
pub struct ChannelConnector<T> {
    name: String,
    tx: mpsc::Sender<T>,
}

impl<T> ChannelConnector<T> {
    /// Create a connector and the receiving end of its channel.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

struct ChannelSender<T> {
    name: String,
    tx: mpsc::Sender<T>,
}

#[async_trait]
impl<T: Send + 'static> StreamSender<T> for ChannelSender<T> {
    async fn send(&mut self, item: T) -> Result<(), SinkError> {
        self.tx.send(item).await.map_err(|_| SinkError::Closed {
            stream: self.name.clone(),
        })
    }
}

#[async_trait]
impl<T: Send + 'static> StreamConnector<T> for ChannelConnector<T> {
    async fn connect(&self) -> Result<Box<dyn StreamSender<T>>, SinkError> {
        if self.tx.is_closed() {
            return Err(SinkError::Connect {
                stream: self.name.clone(),
                reason: "receiver dropped".to_string(),
            });
        }
        Ok(Box::new(ChannelSender {
            name: self.name.clone(),
            tx: self.tx.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every stream it opens fails after `budget` sends.
    struct Flaky {
        connects: AtomicUsize,
        budget: usize,
        delivered: Arc<parking_lot::Mutex<Vec<u32>>>,
    }

    struct FlakySender {
        left: usize,
        delivered: Arc<parking_lot::Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl StreamSender<u32> for FlakySender {
        async fn send(&mut self, item: u32) -> Result<(), SinkError> {
            if self.left == 0 {
                return Err(SinkError::Send {
                    stream: "flaky".into(),
                    reason: "connection reset".into(),
                });
            }
            self.left -= 1;
            self.delivered.lock().push(item);
            Ok(())
        }
    }

    #[async_trait]
    impl StreamConnector<u32> for Flaky {
        async fn connect(&self) -> Result<Box<dyn StreamSender<u32>>, SinkError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FlakySender {
                left: self.budget,
                delivered: self.delivered.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn connects_lazily_and_reuses_the_stream() {
        let (connector, mut rx) = ChannelConnector::<u32>::new("results", 8);
        let stream = LazyStream::new("results", Arc::new(connector));
        assert!(!stream.is_connected().await);

        stream.send(1u32).await.unwrap();
        stream.send(2u32).await.unwrap();
        assert!(stream.is_connected().await);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn failed_send_drops_and_reconnects() {
        let connector = Arc::new(Flaky {
            connects: AtomicUsize::new(0),
            budget: 1,
            delivered: Arc::new(parking_lot::Mutex::new(Vec::new())),
        });
        let stream = LazyStream::new("flaky", connector.clone() as Arc<dyn StreamConnector<u32>>);

        stream.send(1).await.unwrap();
        assert!(stream.send(2).await.is_err());
        assert!(!stream.is_connected().await);
        stream.send(3).await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(*connector.delivered.lock(), vec![1, 3]);
    }

    #[tokio::test]
    async fn closed_receiver_is_a_connect_error() {
        let (connector, rx) = ChannelConnector::<u32>::new("results", 1);
        drop(rx);
        let stream = LazyStream::new("results", Arc::new(connector));
        assert!(matches!(
            stream.send(1).await,
            Err(SinkError::Connect { .. })
        ));
    }
}
