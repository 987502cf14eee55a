use serde::Serialize;

use crate::{
    capabilities::RenderRequest,
    credentials::CredentialStatus,
    errors::{AppError, Result},
    models::{ImageData, Resolution},
    scenes::{Scene, default_scene, find_scene},
};

pub const ANALYSING_LABEL: &str = "正在解析图像与场景...";
pub const CREDENTIAL_FAILURE_MESSAGE: &str = "API Key 验证失败，请重新选择。";
pub const GENERIC_FAILURE_MESSAGE: &str = "生成失败，请重试。";

pub fn rendering_label(resolution: Resolution) -> String {
    format!("正在生成 {resolution} 分辨率的画面...")
}

/// How a generation attempt ended, for the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Succeeded,
    CredentialRejected,
    Failed,
}

/// Everything the page shows. One instance per running service.
#[derive(Debug, Clone)]
pub struct SessionState {
    credential: CredentialStatus,
    source_image: Option<ImageData>,
    selected_scene: &'static Scene,
    selected_resolution: Resolution,
    result_image: Option<ImageData>,
    in_progress: bool,
    progress_label: Option<String>,
    error_message: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            credential: CredentialStatus::Unknown,
            source_image: None,
            selected_scene: default_scene(),
            selected_resolution: Resolution::default(),
            result_image: None,
            in_progress: false,
            progress_label: None,
            error_message: None,
        }
    }
}

impl SessionState {
    pub fn credential_confirmed(&self) -> bool {
        self.credential.is_confirmed()
    }

    pub fn source_image(&self) -> Option<&ImageData> {
        self.source_image.as_ref()
    }

    pub fn result_image(&self) -> Option<&ImageData> {
        self.result_image.as_ref()
    }

    pub fn set_credential(&mut self, status: CredentialStatus) {
        self.credential = status;
    }

    /// Every transition except credential selection is locked behind the gate.
    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.credential_confirmed() {
            Ok(())
        } else {
            Err(AppError::CredentialMissing)
        }
    }

    pub fn confirm_credential_selection(&mut self) {
        self.credential = CredentialStatus::Confirmed;
        self.error_message = None;
    }

    /// A new photo invalidates whatever was produced from the previous one.
    pub fn upload_photo(&mut self, image: ImageData) {
        self.source_image = Some(image);
        self.result_image = None;
        self.error_message = None;
    }

    pub fn clear_photo(&mut self) {
        self.source_image = None;
    }

    pub fn select_scene(&mut self, id: &str) -> Result<()> {
        let scene = find_scene(id).ok_or_else(|| AppError::UnknownScene(id.to_string()))?;
        self.selected_scene = scene;
        Ok(())
    }

    pub fn select_resolution(&mut self, resolution: Resolution) {
        self.selected_resolution = resolution;
    }

    /// First phase of `Generate`. Leaves the state untouched when there is no
    /// photo or an attempt is already running.
    pub fn begin_generation(&mut self) -> Result<()> {
        if self.source_image.is_none() {
            return Err(AppError::GenerationNotReady("请先上传人物照片"));
        }
        if self.in_progress {
            return Err(AppError::GenerationNotReady("已有生成任务正在进行"));
        }

        self.in_progress = true;
        self.error_message = None;
        self.progress_label = Some(ANALYSING_LABEL.to_string());
        Ok(())
    }

    /// Second phase: names the target size and captures the current
    /// selections for the remote call.
    pub fn start_rendering(&mut self) -> Option<RenderRequest> {
        if !self.in_progress {
            return None;
        }
        let source = self.source_image.clone()?;

        self.progress_label = Some(rendering_label(self.selected_resolution));
        Some(RenderRequest {
            source,
            scene: self.selected_scene,
            resolution: self.selected_resolution,
        })
    }

    /// Applies the terminal outcome of the outstanding attempt. A result that
    /// lands after a newer upload still replaces the current one.
    pub fn finish_generation(&mut self, outcome: Result<ImageData>) -> GenerationOutcome {
        self.in_progress = false;
        self.progress_label = None;

        match outcome {
            Ok(image) => {
                self.result_image = Some(image);
                self.error_message = None;
                GenerationOutcome::Succeeded
            }
            Err(err)
                if err.is_authorization_rejected()
                    || matches!(err, AppError::CredentialMissing) =>
            {
                self.credential = CredentialStatus::Unconfirmed;
                self.error_message = Some(CREDENTIAL_FAILURE_MESSAGE.to_string());
                GenerationOutcome::CredentialRejected
            }
            Err(err) => {
                self.error_message = Some(format!("{GENERIC_FAILURE_MESSAGE}{err}"));
                GenerationOutcome::Failed
            }
        }
    }

    pub fn reset(&mut self) {
        self.source_image = None;
        self.result_image = None;
        self.error_message = None;
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            credential_status: self.credential,
            credential_confirmed: self.credential_confirmed(),
            has_source_image: self.source_image.is_some(),
            selected_scene: self.selected_scene,
            selected_resolution: self.selected_resolution,
            has_result: self.result_image.is_some(),
            in_progress: self.in_progress,
            progress_label: self.progress_label.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Image-free projection of the session, cheap enough to broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub credential_status: CredentialStatus,
    pub credential_confirmed: bool,
    pub has_source_image: bool,
    pub selected_scene: &'static Scene,
    pub selected_resolution: Resolution,
    pub has_result: bool,
    pub in_progress: bool,
    pub progress_label: Option<String>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(tag: &str) -> ImageData {
        ImageData::new("image/jpeg", tag.as_bytes().to_vec())
    }

    fn unlocked() -> SessionState {
        let mut state = SessionState::default();
        state.set_credential(CredentialStatus::Confirmed);
        state
    }

    fn generated(state: &mut SessionState) -> RenderRequest {
        state.begin_generation().unwrap();
        state.start_rendering().unwrap()
    }

    #[test]
    fn defaults() {
        let state = SessionState::default();
        let view = state.view();
        assert_eq!(view.credential_status, CredentialStatus::Unknown);
        assert_eq!(view.selected_scene.id, "qingming");
        assert_eq!(view.selected_resolution, Resolution::Size1K);
        assert!(!view.in_progress && !view.has_result && !view.has_source_image);
        assert!(state.ensure_unlocked().is_err());
    }

    #[test]
    fn upload_clears_result_and_error() {
        let mut state = unlocked();
        state.upload_photo(photo("a"));
        generated(&mut state);
        state.finish_generation(Ok(photo("out")));
        assert!(state.result_image().is_some());

        state.upload_photo(photo("b"));
        assert!(state.result_image().is_none());
        assert_eq!(state.source_image(), Some(&photo("b")));

        generated(&mut state);
        state.finish_generation(Err(AppError::other("boom")));
        assert!(state.view().error_message.is_some());
        state.upload_photo(photo("c"));
        assert!(state.view().error_message.is_none());
    }

    #[test]
    fn scene_change_keeps_result() {
        let mut state = unlocked();
        state.upload_photo(photo("a"));
        generated(&mut state);
        state.finish_generation(Ok(photo("out")));

        state.select_scene("dunhuang").unwrap();
        assert_eq!(state.view().selected_scene.id, "dunhuang");
        assert!(state.result_image().is_some());

        assert!(matches!(
            state.select_scene("moon_palace"),
            Err(AppError::UnknownScene(_))
        ));
        assert_eq!(state.view().selected_scene.id, "dunhuang");
    }

    #[test]
    fn clear_photo_keeps_selections() {
        let mut state = unlocked();
        state.select_scene("great_wall").unwrap();
        state.select_resolution(Resolution::Size4K);
        state.upload_photo(photo("a"));
        state.clear_photo();
        let view = state.view();
        assert!(!view.has_source_image);
        assert_eq!(view.selected_scene.id, "great_wall");
        assert_eq!(view.selected_resolution, Resolution::Size4K);
    }

    #[test]
    fn generate_without_photo_is_a_no_op() {
        let mut state = unlocked();
        let before = state.view();
        assert!(matches!(
            state.begin_generation(),
            Err(AppError::GenerationNotReady(_))
        ));
        let after = state.view();
        assert_eq!(before.in_progress, after.in_progress);
        assert_eq!(before.progress_label, after.progress_label);
        assert!(state.start_rendering().is_none());
    }

    #[test]
    fn second_generate_while_running_is_refused() {
        let mut state = unlocked();
        state.upload_photo(photo("a"));
        generated(&mut state);
        let label = state.view().progress_label;
        assert!(state.begin_generation().is_err());
        assert!(state.view().in_progress);
        assert_eq!(state.view().progress_label, label);
    }

    #[test]
    fn progress_labels_follow_phases() {
        let mut state = unlocked();
        state.upload_photo(photo("a"));
        state.select_resolution(Resolution::Size2K);
        state.begin_generation().unwrap();
        assert_eq!(state.view().progress_label.as_deref(), Some(ANALYSING_LABEL));
        state.start_rendering().unwrap();
        assert_eq!(
            state.view().progress_label.as_deref(),
            Some("正在生成 2K 分辨率的画面...")
        );
    }

    #[test]
    fn success_sets_result_and_clears_progress() {
        let mut state = unlocked();
        state.upload_photo(photo("p"));
        state.select_scene("qingming").unwrap();
        let request = generated(&mut state);
        assert_eq!(request.scene.name, "清明上河图");
        assert_eq!(request.resolution, Resolution::Size1K);

        let outcome = state.finish_generation(Ok(photo("painted")));
        assert_eq!(outcome, GenerationOutcome::Succeeded);
        let view = state.view();
        assert!(view.has_result && !view.in_progress);
        assert!(view.progress_label.is_none() && view.error_message.is_none());
    }

    #[test]
    fn no_image_failure_is_generic() {
        let mut state = unlocked();
        state.upload_photo(photo("p"));
        generated(&mut state);
        let outcome = state.finish_generation(Err(AppError::NoImageInResponse));
        assert_eq!(outcome, GenerationOutcome::Failed);
        let view = state.view();
        assert_eq!(
            view.error_message.as_deref(),
            Some("生成失败，请重试。No image data found in response")
        );
        assert!(!view.has_result && !view.in_progress && view.progress_label.is_none());
        assert!(view.credential_confirmed);
    }

    #[test]
    fn entity_not_found_returns_to_gate() {
        let mut state = unlocked();
        state.upload_photo(photo("p"));
        generated(&mut state);
        let outcome = state.finish_generation(Err(AppError::Service {
            http_status: 404,
            message: "Requested entity was not found.".to_string(),
        }));
        assert_eq!(outcome, GenerationOutcome::CredentialRejected);
        let view = state.view();
        assert!(!view.credential_confirmed);
        assert_eq!(view.error_message.as_deref(), Some(CREDENTIAL_FAILURE_MESSAGE));
        assert!(!view.in_progress && view.progress_label.is_none());
        assert!(state.ensure_unlocked().is_err());
    }

    #[test]
    fn vanished_key_returns_to_gate() {
        let mut state = unlocked();
        state.upload_photo(photo("p"));
        generated(&mut state);
        let outcome = state.finish_generation(Err(AppError::CredentialMissing));
        assert_eq!(outcome, GenerationOutcome::CredentialRejected);
        assert!(!state.view().credential_confirmed);
        assert!(state.ensure_unlocked().is_err());
    }

    #[test]
    fn selection_clears_error_and_unlocks() {
        let mut state = unlocked();
        state.upload_photo(photo("p"));
        generated(&mut state);
        state.finish_generation(Err(AppError::AuthorizationRejected("bad key".into())));
        state.confirm_credential_selection();
        assert!(state.credential_confirmed());
        assert!(state.view().error_message.is_none());
    }

    #[test]
    fn reset_keeps_selections() {
        let mut state = unlocked();
        state.select_scene("peach_blossom").unwrap();
        state.select_resolution(Resolution::Size2K);
        state.upload_photo(photo("p"));
        generated(&mut state);
        state.finish_generation(Err(AppError::other("offline")));

        state.reset();
        let view = state.view();
        assert!(!view.has_source_image && !view.has_result);
        assert!(view.error_message.is_none());
        assert_eq!(view.selected_scene.id, "peach_blossom");
        assert_eq!(view.selected_resolution, Resolution::Size2K);
    }

    #[test]
    fn last_resolution_wins() {
        let mut state = unlocked();
        state.upload_photo(photo("p"));
        state.select_resolution(Resolution::Size4K);
        state.select_resolution(Resolution::Size2K);
        assert_eq!(generated(&mut state).resolution, Resolution::Size2K);
    }

    #[test]
    fn late_result_overwrites_after_new_upload() {
        let mut state = unlocked();
        state.upload_photo(photo("first"));
        generated(&mut state);
        state.upload_photo(photo("second"));
        state.finish_generation(Ok(photo("from-first")));
        assert_eq!(state.result_image(), Some(&photo("from-first")));
        assert_eq!(state.source_image(), Some(&photo("second")));
    }
}
