//! Compress→encrypt→send and decrypt→decompress→parse, each stage
//! submitted to the [`Scheduler`] at the priority distilled spec
//! §4.3.3/§4.3.4 assigns it.

use std::sync::Arc;

use courier_compress::Compressor;
use courier_core::Container;
use courier_crypto::{Crypto, Iv, Key};
use courier_scheduler::{Priority, Scheduler};
use tokio::sync::oneshot;

use crate::error::{SessionError, SessionResult};

/// Runs `work` on the scheduler at `priority` and awaits its result,
/// bridging the fire-and-forget scheduler contract back into async code.
pub(crate) async fn run_on<T, F>(scheduler: &Arc<dyn Scheduler>, priority: Priority, work: F) -> SessionResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SessionResult<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    scheduler.submit(
        priority,
        Box::new(move || {
            let _ = tx.send(work());
        }),
    )?;
    rx.await.map_err(|_| SessionError::Framing("scheduler job dropped before completing".into()))?
}

/// Send-path transform (§4.3.3): compress at `High` priority (if enabled),
/// then encrypt at `Normal` priority (if enabled). Order is fixed —
/// compress-then-encrypt, never the reverse.
pub async fn compress_then_encrypt(
    scheduler: &Arc<dyn Scheduler>,
    compressor: &Arc<dyn Compressor>,
    crypto: &Arc<dyn Crypto>,
    compress_mode: bool,
    encrypt_mode: bool,
    key: Option<Key>,
    iv: Option<Iv>,
    bytes: Vec<u8>,
) -> SessionResult<Vec<u8>> {
    let compressed = if compress_mode {
        let compressor = Arc::clone(compressor);
        run_on(scheduler, Priority::High, move || Ok(compressor.compress(&bytes)?)).await?
    } else {
        bytes
    };

    if encrypt_mode {
        let crypto = Arc::clone(crypto);
        let key = key.unwrap_or([0u8; 32]);
        let iv = iv.unwrap_or([0u8; 12]);
        run_on(scheduler, Priority::Normal, move || Ok(crypto.encrypt(&compressed, &key, &iv)?)).await
    } else {
        Ok(compressed)
    }
}

/// Receive-path transform (§4.3.4): decrypt at `High` priority (if
/// enabled), then decompress at `Normal` priority (if enabled) — the exact
/// inverse order of the send path.
pub async fn decrypt_then_decompress(
    scheduler: &Arc<dyn Scheduler>,
    compressor: &Arc<dyn Compressor>,
    crypto: &Arc<dyn Crypto>,
    compress_mode: bool,
    encrypt_mode: bool,
    key: Option<Key>,
    iv: Option<Iv>,
    bytes: Vec<u8>,
) -> SessionResult<Vec<u8>> {
    let decrypted = if encrypt_mode {
        let crypto = Arc::clone(crypto);
        let key = key.unwrap_or([0u8; 32]);
        let iv = iv.unwrap_or([0u8; 12]);
        run_on(scheduler, Priority::High, move || Ok(crypto.decrypt(&bytes, &key, &iv)?)).await?
    } else {
        bytes
    };

    if compress_mode {
        let compressor = Arc::clone(compressor);
        run_on(scheduler, Priority::Normal, move || Ok(compressor.decompress(&decrypted)?)).await
    } else {
        Ok(decrypted)
    }
}

/// Parses a received, already-decompressed/decrypted payload into a
/// [`Container`] at `High` priority (§4.3.4 step 3).
pub async fn parse_container(scheduler: &Arc<dyn Scheduler>, bytes: Vec<u8>) -> SessionResult<Container> {
    run_on(scheduler, Priority::High, move || Ok(Container::from_bytes(&bytes, false)?)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_compress::DeflateCompressor;
    use courier_crypto::AesGcmCrypto;
    use courier_scheduler::{WorkerPool, WorkerPoolConfig};

    #[tokio::test]
    async fn round_trips_with_compress_and_encrypt_both_on() {
        let pool: Arc<dyn Scheduler> = Arc::new(WorkerPool::new(WorkerPoolConfig {
            worker_count: 2,
            queue_capacity: 64,
        }));
        let compressor: Arc<dyn Compressor> = Arc::new(DeflateCompressor);
        let crypto: Arc<dyn Crypto> = Arc::new(AesGcmCrypto);
        let (key, iv) = crypto.create_key().unwrap();

        let message = b"route this payload through the pipeline".repeat(4);
        let sent = compress_then_encrypt(&pool, &compressor, &crypto, true, true, Some(key), Some(iv), message.clone())
            .await
            .unwrap();
        let received = decrypt_then_decompress(&pool, &compressor, &crypto, true, true, Some(key), Some(iv), sent)
            .await
            .unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn passthrough_when_both_disabled() {
        let pool: Arc<dyn Scheduler> = Arc::new(WorkerPool::new(WorkerPoolConfig {
            worker_count: 1,
            queue_capacity: 16,
        }));
        let compressor: Arc<dyn Compressor> = Arc::new(DeflateCompressor);
        let crypto: Arc<dyn Crypto> = Arc::new(AesGcmCrypto);

        let message = b"plain".to_vec();
        let sent = compress_then_encrypt(&pool, &compressor, &crypto, false, false, None, None, message.clone())
            .await
            .unwrap();
        assert_eq!(sent, message);
    }
}
