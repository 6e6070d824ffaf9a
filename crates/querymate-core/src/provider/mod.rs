pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Trait for hosted text-generation backends: one prompt in, one text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run a single generation call against the named model.
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, ProviderError>;
}

/// Gateway that tries a prioritized list of model candidates in order,
/// racing each call against a fixed deadline, until one succeeds.
///
/// A candidate is never retried; a timeout or any call error just advances
/// to the next candidate. Only exhaustion of the whole list surfaces, as
/// `ProviderError::AllModelsFailed` wrapping the last underlying error.
pub struct ModelGateway {
    provider: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Generate text, returning the first successful candidate's output as-is.
    pub async fn generate(
        &self,
        prompt: &str,
        candidates: &[String],
    ) -> Result<String, ProviderError> {
        self.generate_parsed(prompt, candidates, |text| Ok(text.to_string()))
            .await
    }

    /// Generate and parse in one pass: a parse failure counts as that
    /// candidate's failure, so a model emitting garbage falls through to
    /// the next one in the list.
    pub async fn generate_parsed<T, F>(
        &self,
        prompt: &str,
        candidates: &[String],
        parse: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn(&str) -> Result<T, ProviderError>,
    {
        let mut last_error = ProviderError::Other("no model candidates configured".to_string());

        for model in candidates {
            debug!("Trying model candidate {}", model);
            match tokio::time::timeout(self.timeout, self.provider.generate(prompt, model)).await {
                Ok(Ok(text)) => match parse(&text) {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        warn!("Model {} returned unparseable output: {}, trying next", model, e);
                        last_error = e;
                    }
                },
                Ok(Err(e)) => {
                    warn!("Model {} failed: {}, trying next", model, e);
                    last_error = e;
                }
                Err(_) => {
                    let ms = self.timeout.as_millis() as u64;
                    warn!("Model {} timed out after {}ms, trying next", model, ms);
                    last_error = ProviderError::Timeout(ms);
                }
            }
        }

        Err(ProviderError::AllModelsFailed(Box::new(last_error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedGenerator {
        /// Candidate name -> canned outcome. Anything absent fails.
        succeed_on: String,
        output: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str, model: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if model == self.succeed_on {
                Ok(self.output.clone())
            } else {
                Err(ProviderError::Api {
                    status: 429,
                    message: format!("{model} over quota"),
                })
            }
        }
    }

    struct HangingGenerator;

    #[async_trait]
    impl TextGenerator for HangingGenerator {
        async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn candidates(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn falls_through_to_first_succeeding_candidate() {
        let gen = Arc::new(ScriptedGenerator {
            succeed_on: "m3".to_string(),
            output: "hello from m3".to_string(),
            calls: AtomicUsize::new(0),
        });
        let gateway = ModelGateway::new(gen.clone(), Duration::from_secs(5));

        let out = gateway
            .generate("prompt", &candidates(&["m1", "m2", "m3"]))
            .await
            .unwrap();
        assert_eq!(out, "hello from m3");
        assert_eq!(gen.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_error() {
        let gen = Arc::new(ScriptedGenerator {
            succeed_on: "never".to_string(),
            output: String::new(),
            calls: AtomicUsize::new(0),
        });
        let gateway = ModelGateway::new(gen, Duration::from_secs(5));

        let err = gateway
            .generate("prompt", &candidates(&["m1", "m2", "m3"]))
            .await
            .unwrap_err();
        assert!(err.is_exhausted());
        match err {
            ProviderError::AllModelsFailed(inner) => {
                assert!(inner.to_string().contains("m3 over quota"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_counts_as_timeout() {
        let gateway = ModelGateway::new(Arc::new(HangingGenerator), Duration::from_millis(100));

        let err = gateway
            .generate("prompt", &candidates(&["m1"]))
            .await
            .unwrap_err();
        match err {
            ProviderError::AllModelsFailed(inner) => {
                assert!(matches!(*inner, ProviderError::Timeout(100)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn parse_failure_advances_to_next_candidate() {
        struct TwoOutputs {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl TextGenerator for TwoOutputs {
            async fn generate(&self, _p: &str, _m: &str) -> Result<String, ProviderError> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(if n == 0 { "not json".into() } else { "42".into() })
            }
        }

        let gateway = ModelGateway::new(
            Arc::new(TwoOutputs { calls: AtomicUsize::new(0) }),
            Duration::from_secs(5),
        );
        let value: u32 = gateway
            .generate_parsed("prompt", &candidates(&["m1", "m2"]), |text| {
                text.parse()
                    .map_err(|e| ProviderError::Parse(format!("{e}")))
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn empty_candidate_list_is_exhaustion() {
        let gen = Arc::new(ScriptedGenerator {
            succeed_on: "m1".to_string(),
            output: "x".to_string(),
            calls: AtomicUsize::new(0),
        });
        let gateway = ModelGateway::new(gen, Duration::from_secs(5));
        let err = gateway.generate("prompt", &[]).await.unwrap_err();
        assert!(err.is_exhausted());
    }
}
