use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    capabilities::{RenderRequest, SceneRenderer},
    config::GeminiConfig,
    credentials::CredentialGate,
    errors::{AppError, Result},
    models::ImageData,
    providers::gemini::{
        GenerateContentRequest, GenerationConfig, GeminiImageModel, ImageConfig, InlineBlob,
        RequestContent, RequestPart,
    },
    scenes::Scene,
};

const RESULT_MIME: &str = "image/png";

pub fn compose_prompt(scene: &Scene) -> String {
    format!(
        r#"You are a legendary master of Traditional Chinese Painting (Guohua).

Your task is to re-imagine the person from the input image as a character naturally living inside a specific traditional Chinese art masterpiece.

**TARGET SCENE & STYLE:**
{modifier}

**STRICT GENERATION GUIDELINES:**
1. **Complete Style Immersion**: The subject MUST NOT look like a photograph pasted onto a background. Render the person using the EXACT same artistic medium as the scene (e.g., ink strokes and wash gradients for Ink Wash; mineral pigment textures and weathering for a Mural).
2. **Period-Accurate Clothing**: Completely ignore the person's modern clothes. Dress the subject in exquisite, historically accurate Hanfu or attire of the scene's dynasty. Fabric folds and textures must match the painting style.
3. **Natural Composition**: The subject interacts naturally with the environment (standing on the ground, sitting in a boat, leaning on a railing). Match lighting, shadows, perspective and color temperature of the subject to the background.
4. **Identity Preservation**: Retain the person's key facial features so they stay recognizable, while stylizing the face to blend seamlessly into the artwork.

Output a single, cohesive, high-quality image that looks like an authentic piece of traditional art."#,
        modifier = scene.prompt_modifier
    )
}

/// Gemini-backed renderer. Holds configuration only; the HTTP client and the
/// key are resolved again for every call.
pub struct ImageGenerator {
    config: GeminiConfig,
    gate: Arc<CredentialGate>,
}

impl ImageGenerator {
    pub fn new(config: GeminiConfig, gate: Arc<CredentialGate>) -> Self {
        Self { config, gate }
    }

    async fn generate(&self, request: &RenderRequest) -> Result<ImageData> {
        let api_key = self
            .gate
            .current_key()
            .await
            .ok_or(AppError::CredentialMissing)?;
        let model = GeminiImageModel::new(&self.config, api_key)?;

        let prompt = compose_prompt(request.scene);
        let payload = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text { text: &prompt },
                    RequestPart::InlineData {
                        inline_data: InlineBlob {
                            mime_type: request.source.request_mime_type(),
                            data: request.source.to_base64(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                image_config: ImageConfig {
                    image_size: request.resolution.as_str(),
                    aspect_ratio: &self.config.aspect_ratio,
                },
            },
        };

        let response = model.generate_content(&payload).await?;
        let encoded = response
            .first_inline_image()
            .ok_or(AppError::NoImageInResponse)?;
        let data = BASE64_STANDARD
            .decode(encoded)
            .map_err(|err| AppError::other(format!("生成结果 Base64 解码失败: {err}")))?;

        info!(
            target: "gemini",
            scene = request.scene.id,
            size = %request.resolution,
            bytes = data.len(),
            "图像生成完成"
        );

        Ok(ImageData::new(RESULT_MIME, data))
    }
}

impl SceneRenderer for ImageGenerator {
    async fn render(&self, request: RenderRequest, cancel: CancellationToken) -> Result<ImageData> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = self.generate(&request) => result,
        }
    }
}
