mod image;

pub use image::ImageGenerator;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{
    errors::Result,
    models::{ImageData, Resolution},
    scenes::Scene,
};

/// Everything one generation attempt needs, captured when it starts.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: ImageData,
    pub scene: &'static Scene,
    pub resolution: Resolution,
}

/// Turns a portrait into a scene-styled image. One attempt per call; retries
/// are left to the caller.
pub trait SceneRenderer: Send + Sync + 'static {
    fn render(
        &self,
        request: RenderRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<ImageData>> + Send;
}
