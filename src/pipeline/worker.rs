//! Generation worker: one OS thread per turn feeding a fragment channel.

use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::ai::{GenerationRequest, LanguageModel};

/// The fragments of one turn, in the order the model produced them.
///
/// Finite and single-use: it ends when the worker thread finishes (normally or
/// not). Dropping it tells the worker to stop reading the model stream.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::UnboundedReceiver<String>,
}

impl FragmentStream {
    pub async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Starts the inference call for one turn on a fresh thread.
///
/// A failed call is logged and simply ends the stream early; the consumer never
/// sees a distinguished error.
pub fn spawn_generation(
    model: Arc<dyn LanguageModel>,
    request: GenerationRequest,
    turn_id: u64,
) -> FragmentStream {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawned = thread::Builder::new()
        .name(format!("generation-{}", turn_id))
        .spawn(move || {
            let mut produced = 0usize;
            let mut sink = |fragment: String| {
                produced += 1;
                tx.send(fragment).is_ok()
            };

            match model.stream_chat(&request, &mut sink) {
                Ok(()) => debug!(turn_id, produced, "generation finished"),
                Err(e) => warn!(turn_id, produced, error = %e, "generation ended early"),
            }
        });

    // On spawn failure the sender is already gone, so the stream is empty.
    if let Err(e) = spawned {
        error!(turn_id, error = %e, "could not start generation thread");
    }

    FragmentStream { rx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::transcript::ChatMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    struct Scripted(Vec<&'static str>);

    impl LanguageModel for Scripted {
        fn stream_chat(
            &self,
            _request: &GenerationRequest,
            sink: &mut dyn FnMut(String) -> bool,
        ) -> Result<(), GenerationError> {
            for piece in &self.0 {
                if !sink(piece.to_string()) {
                    break;
                }
            }
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    struct Failing;

    impl LanguageModel for Failing {
        fn stream_chat(
            &self,
            _request: &GenerationRequest,
            sink: &mut dyn FnMut(String) -> bool,
        ) -> Result<(), GenerationError> {
            sink("partial".to_string());
            Err(GenerationError::Service("model crashed".to_string()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    /// Emits until the receiver is dropped, then reports how far it got.
    struct Endless {
        sent: Arc<AtomicUsize>,
        done: std_mpsc::Sender<()>,
    }

    impl LanguageModel for Endless {
        fn stream_chat(
            &self,
            _request: &GenerationRequest,
            sink: &mut dyn FnMut(String) -> bool,
        ) -> Result<(), GenerationError> {
            while sink("x".to_string()) {
                self.sent.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            }
            let _ = self.done.send(());
            Ok(())
        }

        fn describe(&self) -> String {
            "endless".to_string()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            messages: vec![ChatMessage::user("ሰላም")],
            max_tokens: 32,
            repetition_penalty: 1.1,
        }
    }

    #[tokio::test]
    async fn test_fragments_arrive_in_order_then_end() {
        let model = Arc::new(Scripted(vec!["ሰ", "ላም", " ነህ"]));
        let mut stream = spawn_generation(model, request(), 1);

        let mut received = Vec::new();
        while let Some(fragment) = stream.next().await {
            received.push(fragment);
        }
        assert_eq!(received, vec!["ሰ", "ላም", " ነህ"]);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_output() {
        let mut stream = spawn_generation(Arc::new(Failing), request(), 2);

        assert_eq!(stream.next().await.as_deref(), Some("partial"));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_worker() {
        let sent = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = std_mpsc::channel();
        let model = Arc::new(Endless { sent: sent.clone(), done: done_tx });

        let mut stream = spawn_generation(model, request(), 3);
        assert!(stream.next().await.is_some());
        drop(stream);

        let finished = tokio::task::spawn_blocking(move || done_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(finished.is_ok(), "worker kept running after the stream was dropped");
    }
}
