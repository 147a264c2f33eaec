use std::future::Future;

use futures::stream::{self, StreamExt};

use super::ImageModel;
use crate::errors::{PipelineError, PipelineResult};

/// One worker per available core, which is how many image calls run at once by default.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Run `work` on every job, at most `limit` at a time, and return the outputs
/// paired with their job's key, in job order.
///
/// Completion order doesn't matter: each result is carried back alongside the
/// position it was dispatched from. The first failure to arrive ends the whole
/// batch; work still in flight is dropped and no partial results are returned.
/// A `ModelInvocation` failure becomes `PartialGenerationFailure` naming the
/// job's position, any other kind is returned as it is.
pub async fn fan_out<K, I, O, F, Fut>(
    jobs: Vec<(K, I)>,
    limit: usize,
    work: F,
) -> PipelineResult<Vec<(K, O)>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = PipelineResult<O>>,
{
    let (keys, inputs): (Vec<K>, Vec<I>) = jobs.into_iter().unzip();
    let mut slots: Vec<Option<O>> = std::iter::repeat_with(|| None).take(keys.len()).collect();

    let mut in_flight = stream::iter(inputs.into_iter().enumerate().map(|(index, input)| {
        let call = work(input);
        async move { (index, call.await) }
    }))
    .buffer_unordered(limit.max(1));

    while let Some((index, result)) = in_flight.next().await {
        match result {
            Ok(output) => slots[index] = Some(output),
            Err(PipelineError::ModelInvocation(source)) => {
                tracing::error!("Fan-out job {} failed: {:#}", index, source);
                return Err(PipelineError::PartialGenerationFailure { index, source });
            }
            Err(err) => {
                tracing::error!("Fan-out job {} failed: {}", index, err);
                return Err(err);
            }
        }
    }

    keys.into_iter()
        .zip(slots)
        .enumerate()
        .map(|(index, (key, slot))| match slot {
            Some(output) => Ok((key, output)),
            None => Err(PipelineError::PartialGenerationFailure {
                index,
                source: anyhow::anyhow!("job finished without a result"),
            }),
        })
        .collect()
}

/// Generate one image per prompt; `result[i]` always depicts `prompts[i]`.
pub async fn generate_all(
    model: &dyn ImageModel,
    prompts: &[String],
    limit: usize,
) -> PipelineResult<Vec<Vec<u8>>> {
    let jobs = prompts.iter().map(|prompt| ((), prompt.as_str())).collect();
    let images = fan_out(jobs, limit, |prompt| async move {
        model
            .generate(prompt)
            .await
            .map_err(PipelineError::ModelInvocation)
    })
    .await?;
    Ok(images.into_iter().map(|(_, image)| image).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use rand::Rng;
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fingerprint(prompt: &str) -> Vec<u8> {
        Sha256::digest(prompt.as_bytes()).to_vec()
    }

    /// Hashes the prompt into the image, after a random delay, unless the prompt is poisoned.
    struct HashingModel {
        poisoned: Option<String>,
        started: AtomicUsize,
    }

    impl HashingModel {
        fn new(poisoned: Option<String>) -> Self {
            Self {
                poisoned,
                started: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageModel for HashingModel {
        async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let delay = rand::thread_rng().gen_range(0..15);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if self.poisoned.as_deref() == Some(prompt) {
                bail!("model refused {prompt}");
            }
            Ok(fingerprint(prompt))
        }
    }

    fn prompts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("dish number {i}")).collect()
    }

    #[tokio::test]
    async fn test_order_survives_random_completion() {
        let model = HashingModel::new(None);
        for n in 0..=8 {
            for limit in [1, 3, 16] {
                let prompts = prompts(n);
                let images = generate_all(&model, &prompts, limit).await.unwrap();
                assert_eq!(images.len(), n);
                for (prompt, image) in prompts.iter().zip(&images) {
                    assert_eq!(image, &fingerprint(prompt));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_any_failure_fails_the_batch() {
        let n = 6;
        for poisoned in 0..n {
            let prompts = prompts(n);
            let model = HashingModel::new(Some(prompts[poisoned].clone()));
            match generate_all(&model, &prompts, 4).await {
                Err(PipelineError::PartialGenerationFailure { index, .. }) => {
                    assert_eq!(index, poisoned)
                }
                other => panic!("expected a partial failure, got {:?}", other.map(|v| v.len())),
            }
        }
    }

    #[tokio::test]
    async fn test_failure_stops_dispatch() {
        let prompts = prompts(5);
        let model = HashingModel::new(Some(prompts[1].clone()));
        assert!(generate_all(&model, &prompts, 1).await.is_err());
        assert_eq!(model.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_keys_travel_with_results() {
        let jobs = vec![("c", 3u64), ("a", 1), ("b", 2)];
        let results = fan_out(jobs, 3, |n| async move {
            tokio::time::sleep(Duration::from_millis(n * 5)).await;
            Ok::<_, PipelineError>(n * 10)
        })
        .await
        .unwrap();
        assert_eq!(results, vec![("c", 30), ("a", 10), ("b", 20)]);
    }

    #[tokio::test]
    async fn test_other_failures_pass_through() {
        let jobs = vec![((), 1), ((), 2)];
        let result = fan_out(jobs, 2, |n| async move {
            if n == 2 {
                Err(PipelineError::StorageWrite(anyhow::anyhow!("bucket gone")))
            } else {
                Ok(n)
            }
        })
        .await;
        assert!(matches!(result, Err(PipelineError::StorageWrite(_))));
    }

    #[test]
    fn test_default_concurrency() {
        assert!(default_concurrency() >= 1);
    }
}
