use std::sync::Arc;

use rollcall_core::engine::MarkRequest;
use tokio::sync::Mutex;
use zbus::interface;

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::store::AttendanceStore;

/// Shared state accessible by D-Bus method handlers.
pub struct AppState {
    pub config: Config,
    pub engine: EngineHandle,
    pub store: AttendanceStore,
}

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    pub state: Arc<Mutex<AppState>>,
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Verify the claimed identity against the camera and record attendance.
    ///
    /// Returns (success, message). An empty `session` means no session
    /// scoping. Recognition failures come back as `success = false` with
    /// user guidance in the message; infrastructure failures raise a D-Bus
    /// error instead.
    async fn mark_attendance(
        &self,
        student_id: &str,
        display_name: &str,
        session: &str,
    ) -> zbus::fdo::Result<(bool, String)> {
        tracing::info!(student_id, session, "mark_attendance requested");

        let session = if session.is_empty() {
            None
        } else {
            Some(session.to_string())
        };

        // Copy what the run needs while holding the lock, then release it —
        // a verification run takes seconds.
        let (engine, store) = {
            let state = self.state.lock().await;
            (state.engine.clone(), state.store.clone())
        };

        // Once-per-session guard: the engine decides recognition, the caller
        // owns idempotency.
        let already = store
            .has_marked(student_id, session.as_deref())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "attendance lookup failed");
                zbus::fdo::Error::Failed(e.to_string())
            })?;
        if already {
            tracing::info!(student_id, "attendance already recorded for this session");
            return Ok((
                true,
                format!("Attendance already marked for {display_name} in this session."),
            ));
        }

        let request = MarkRequest {
            identity: student_id.to_string(),
            display_name: display_name.to_string(),
            session,
        };

        let outcome = engine.mark(request).await.map_err(|e| {
            tracing::error!(error = %e, "verification run failed");
            zbus::fdo::Error::Failed(e.to_string())
        })?;

        tracing::info!(
            student_id,
            success = outcome.success,
            outcome = %outcome.message,
            "mark_attendance complete"
        );
        Ok((outcome.success, outcome.message))
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let state = self.state.lock().await;
        let recorded = state.store.count_all().await.unwrap_or(0);

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": state.config.camera_device,
            "gallery": state.config.gallery_path,
            "records": recorded,
            "min_confidence": state.config.min_confidence,
            "max_retries": state.config.max_retries,
        })
        .to_string())
    }

    /// Most recent attendance events as JSON, newest first.
    async fn recent_records(&self, limit: u32) -> zbus::fdo::Result<String> {
        let state = self.state.lock().await;
        let events = state
            .store
            .recent(limit)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&events).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}
