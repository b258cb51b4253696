use crate::scheduler::Scheduler;
use connectors::double_write::Mode;
use model::entity::Entity;
use serde::Serialize;
use std::sync::Arc;

/// Payload every control operation answers with. `code` is zero on success;
/// a nonzero `code` carries the failure message (the transport always
/// responds 200).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ControlResponse {
    pub code: i64,
    pub msg: String,
}

impl ControlResponse {
    fn ok(msg: impl Into<String>) -> Self {
        ControlResponse {
            code: 0,
            msg: msg.into(),
        }
    }

    fn fail(msg: impl Into<String>) -> Self {
        ControlResponse {
            code: 1,
            msg: msg.into(),
        }
    }
}

/// Transport-agnostic binding of the control surface: a host HTTP framework
/// maps its POST routes onto these methods one-to-one
/// (`/start/full` → [`Controller::start_full`], `/src_only` →
/// [`Controller::src_only`], ...).
pub struct Controller<T: Entity> {
    scheduler: Arc<Scheduler<T>>,
}

impl<T: Entity> Controller<T> {
    pub fn new(scheduler: Arc<Scheduler<T>>) -> Self {
        Controller { scheduler }
    }

    pub async fn start_full(&self) -> ControlResponse {
        self.scheduler.start_full().await;
        ControlResponse::ok("开始全量校验")
    }

    pub async fn stop_full(&self) -> ControlResponse {
        self.scheduler.stop_full().await;
        ControlResponse::ok("全量校验取消成功")
    }

    pub async fn start_incr(&self) -> ControlResponse {
        self.scheduler.start_incr().await;
        ControlResponse::ok("开始增量校验")
    }

    pub async fn stop_incr(&self) -> ControlResponse {
        self.scheduler.stop_incr().await;
        ControlResponse::ok("增量校验取消成功")
    }

    pub async fn src_only(&self) -> ControlResponse {
        self.set_known_mode(Mode::SrcOnly).await
    }

    pub async fn src_first(&self) -> ControlResponse {
        self.set_known_mode(Mode::SrcFirst).await
    }

    pub async fn dst_first(&self) -> ControlResponse {
        self.set_known_mode(Mode::DstFirst).await
    }

    pub async fn dst_only(&self) -> ControlResponse {
        self.set_known_mode(Mode::DstOnly).await
    }

    /// Mode change from an untyped transport string. Unknown values are
    /// rejected without touching the pool.
    pub async fn set_mode(&self, raw: &str) -> ControlResponse {
        match raw.parse::<Mode>() {
            Ok(mode) => self.set_known_mode(mode).await,
            Err(err) => ControlResponse::fail(err.to_string()),
        }
    }

    async fn set_known_mode(&self, mode: Mode) -> ControlResponse {
        self.scheduler.set_mode(mode).await;
        ControlResponse::ok(format!("{mode} OK"))
    }
}
