//! Startup model loading
//!
//! Announces the load on the status channel, builds the model through a
//! [`ModelFactory`], and reports the outcome. A failed load is final: no
//! retry, no other model, no device downgrade.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::io::AsyncWrite;
use tracing::{error, info};

use crate::models::{error_chain, panic_message, Device, EmbeddingError, EmbeddingModel, ModelFactory};
use crate::protocol::status::{StatusChannel, StatusEvent};
use crate::server::ServiceError;

/// Loads the one model the service runs with
pub struct ModelLoader<'a> {
    factory: &'a dyn ModelFactory,
}

impl<'a> ModelLoader<'a> {
    pub fn new(factory: &'a dyn ModelFactory) -> Self {
        Self { factory }
    }

    /// Load `model_name` onto `device`.
    ///
    /// Emits `ready` before the attempt and then exactly one of `loaded` or
    /// `error`. A factory that panics counts as a failed load.
    pub async fn load<W: AsyncWrite + Unpin>(
        &self,
        model_name: &str,
        device: Device,
        requested: &str,
        status: &mut StatusChannel<W>,
    ) -> Result<Box<dyn EmbeddingModel>, ServiceError> {
        status
            .emit(&StatusEvent::ready(model_name, device, requested))
            .await?;

        let attempt = AssertUnwindSafe(self.factory.create_model(model_name, device))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(EmbeddingError::ModelLoadFailed {
                    error: format!("model backend panicked: {}", panic_message(payload.as_ref())),
                })
            });

        match attempt {
            Ok(model) => {
                info!(model = %model.info().name, %device, "model loaded");
                status.emit(&StatusEvent::loaded(device)).await?;
                Ok(model)
            }
            Err(e) => {
                error!(model = model_name, %device, error = %e, "model load failed");
                status
                    .emit(&StatusEvent::error(
                        format!("Failed to load model: {}", e),
                        Some(error_chain(&e)),
                    ))
                    .await?;
                Err(ServiceError::ModelLoad(e))
            }
        }
    }
}
