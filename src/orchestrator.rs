use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    capabilities::SceneRenderer,
    credentials::{CredentialGate, CredentialStatus},
    errors::{AppError, Result},
    models::{ImageData, Resolution},
    session::{GenerationOutcome, SessionState, SessionView},
    sse::{BroadcastSender, broadcast_json},
};

pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Input to the controller task. Every variant except `GenerationFinished`
/// comes from the HTTP layer and carries a reply channel.
#[derive(Debug)]
pub enum SessionCommand {
    State {
        reply: Reply<SessionView>,
    },
    SelectCredential {
        api_key: Option<String>,
        reply: Reply<SessionView>,
    },
    UploadPhoto {
        image: ImageData,
        reply: Reply<SessionView>,
    },
    ClearPhoto {
        reply: Reply<SessionView>,
    },
    SourceImage {
        reply: Reply<ImageData>,
    },
    SelectScene {
        id: String,
        reply: Reply<SessionView>,
    },
    SelectResolution {
        resolution: Resolution,
        reply: Reply<SessionView>,
    },
    Generate {
        reply: Reply<SessionView>,
    },
    Reset {
        reply: Reply<SessionView>,
    },
    ResultImage {
        reply: Reply<ImageData>,
    },
    GenerationFinished {
        attempt: Uuid,
        outcome: Result<ImageData>,
    },
}

struct InFlight {
    attempt: Uuid,
    cancel: CancellationToken,
}

/// Sole owner of the session state. Remote calls run on spawned tasks and
/// report back through `command_tx`, so mutation never leaves this task.
pub struct SessionController<R: SceneRenderer> {
    session: SessionState,
    gate: Arc<CredentialGate>,
    renderer: Arc<R>,
    command_tx: mpsc::Sender<SessionCommand>,
    broadcaster: Option<BroadcastSender>,
    in_flight: Option<InFlight>,
}

impl<R: SceneRenderer> SessionController<R> {
    pub async fn new(
        gate: Arc<CredentialGate>,
        renderer: Arc<R>,
        command_tx: mpsc::Sender<SessionCommand>,
        broadcaster: Option<BroadcastSender>,
    ) -> Self {
        let mut session = SessionState::default();
        let found = gate.probe().await;
        session.set_credential(CredentialStatus::from_probe(found));
        info!(
            target: "credentials",
            confirmed = found,
            selector = gate.has_selection_flow(),
            "API Key 检查完成"
        );

        Self {
            session,
            gate,
            renderer,
            command_tx,
            broadcaster,
            in_flight: None,
        }
    }

    pub fn view(&self) -> SessionView {
        self.session.view()
    }

    pub async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::State { reply } => {
                let _ = reply.send(Ok(self.view()));
            }
            SessionCommand::SelectCredential { api_key, reply } => {
                let result = self.select_credential(api_key).await;
                let _ = reply.send(result);
            }
            SessionCommand::UploadPhoto { image, reply } => {
                let result = self.mutate(|session| {
                    session.upload_photo(image);
                    Ok(())
                });
                let _ = reply.send(result);
            }
            SessionCommand::ClearPhoto { reply } => {
                let result = self.mutate(|session| {
                    session.clear_photo();
                    Ok(())
                });
                let _ = reply.send(result);
            }
            SessionCommand::SourceImage { reply } => {
                let result = self.session.ensure_unlocked().and_then(|_| {
                    self.session
                        .source_image()
                        .cloned()
                        .ok_or_else(|| AppError::invalid_image("尚未上传照片"))
                });
                let _ = reply.send(result);
            }
            SessionCommand::SelectScene { id, reply } => {
                let result = self.mutate(|session| session.select_scene(&id));
                let _ = reply.send(result);
            }
            SessionCommand::SelectResolution { resolution, reply } => {
                let result = self.mutate(|session| {
                    session.select_resolution(resolution);
                    Ok(())
                });
                let _ = reply.send(result);
            }
            SessionCommand::Generate { reply } => {
                let result = self.generate();
                let _ = reply.send(result);
            }
            SessionCommand::Reset { reply } => {
                let result = self.mutate(|session| {
                    session.reset();
                    Ok(())
                });
                let _ = reply.send(result);
            }
            SessionCommand::ResultImage { reply } => {
                let result = self.session.ensure_unlocked().and_then(|_| {
                    self.session.result_image().cloned().ok_or(AppError::NoResult)
                });
                let _ = reply.send(result);
            }
            SessionCommand::GenerationFinished { attempt, outcome } => {
                self.finish_generation(attempt, outcome);
            }
        }
    }

    /// Cancels the outstanding remote call, if any. Only used on shutdown.
    pub fn shutdown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            info!(target: "session", attempt = %in_flight.attempt, "取消进行中的生成任务");
            in_flight.cancel.cancel();
        }
    }

    fn mutate(
        &mut self,
        apply: impl FnOnce(&mut SessionState) -> Result<()>,
    ) -> Result<SessionView> {
        self.session.ensure_unlocked()?;
        apply(&mut self.session)?;
        Ok(self.publish())
    }

    async fn select_credential(&mut self, api_key: Option<String>) -> Result<SessionView> {
        self.gate.request_selection(api_key).await?;
        self.session.confirm_credential_selection();
        info!(target: "credentials", "API Key 已确认");
        Ok(self.publish())
    }

    fn generate(&mut self) -> Result<SessionView> {
        self.session.ensure_unlocked()?;
        self.session.begin_generation()?;
        self.publish();

        let request = self
            .session
            .start_rendering()
            .ok_or_else(|| AppError::other("生成任务状态异常"))?;
        let view = self.publish();

        let attempt = Uuid::new_v4();
        let cancel = CancellationToken::new();
        info!(
            target: "session",
            %attempt,
            scene = request.scene.id,
            size = %request.resolution,
            "开始生成图像"
        );

        let renderer = self.renderer.clone();
        let command_tx = self.command_tx.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let outcome = renderer.render(request, task_cancel).await;
            let finished = SessionCommand::GenerationFinished { attempt, outcome };
            if command_tx.send(finished).await.is_err() {
                warn!(target: "session", %attempt, "控制器已关闭，丢弃生成结果");
            }
        });

        self.in_flight = Some(InFlight { attempt, cancel });
        Ok(view)
    }

    fn finish_generation(&mut self, attempt: Uuid, outcome: Result<ImageData>) {
        match self.in_flight.take() {
            Some(in_flight) if in_flight.attempt == attempt => {}
            _ => debug!(target: "session", %attempt, "收到非当前任务的生成结果"),
        }

        let detail = outcome.as_ref().err().map(|err| err.to_string());
        let result = self.session.finish_generation(outcome);
        let view = self.publish();

        let event = match result {
            GenerationOutcome::Succeeded => {
                info!(target: "session", %attempt, "生成成功");
                "generation.finished"
            }
            GenerationOutcome::CredentialRejected => {
                warn!(target: "session", %attempt, error = ?detail, "API Key 被拒绝，返回密钥选择");
                "generation.failed"
            }
            GenerationOutcome::Failed => {
                warn!(target: "session", %attempt, error = ?detail, "生成失败");
                "generation.failed"
            }
        };

        if let Some(broadcaster) = &self.broadcaster {
            broadcast_json(
                broadcaster,
                event,
                json!({
                    "attempt": attempt,
                    "credentialRejected": result == GenerationOutcome::CredentialRejected,
                    "session": view,
                }),
            );
        }
    }

    fn publish(&self) -> SessionView {
        let view = self.session.view();
        if let Some(broadcaster) = &self.broadcaster {
            broadcast_json(broadcaster, "session.updated", json!(view));
        }
        view
    }
}
