use std::future::Future;

/// Try `op(item)` across all items in order, once each, and stop at the first success.
///
/// There is no backoff: a failed item is never retried. On total failure every error is returned
/// in item order so the caller can log them.
pub async fn try_in_order<I, T, E, Fut>(
    items: &[I],
    mut op: impl FnMut(&I) -> Fut + Send,
) -> Result<T, Vec<E>>
where
    I: Sync,
    Fut: Future<Output = Result<T, E>> + Send,
{
    let mut errors = Vec::with_capacity(items.len());
    for item in items {
        match op(item).await {
            Ok(v) => return Ok(v),
            Err(e) => errors.push(e),
        }
    }
    Err(errors)
}
