//! The microVM record: the central entity of the agent.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nestbox_core::{MicroVmConfig, MicroVmInfo, VmId};
use nestbox_vmm::supervisor;
use nestbox_vmm::{ConsoleIn, ConsoleOut, VmProcess, VmmError, VmmSettings};
use tokio::sync::Mutex;

use crate::proxy::VmProxy;

/// A single microVM record.
///
/// Identity fields never change after creation; everything scoped to the
/// live subprocess sits in [`VmRuntime`] behind the record lock.
#[derive(Debug)]
pub struct MicroVm {
    pub id: VmId,
    pub name: String,
    pub socket_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub config: Option<MicroVmConfig>,
    runtime: Mutex<VmRuntime>,
}

/// Subprocess-scoped state: both fields are `Some` exactly while the
/// subprocess is live.
#[derive(Debug, Default)]
struct VmRuntime {
    process: Option<VmProcess>,
    proxy: Option<VmProxy>,
}

impl MicroVm {
    /// Builds a stopped record.
    #[must_use]
    pub fn new(
        id: VmId,
        name: impl Into<String>,
        socket_path: PathBuf,
        config: Option<MicroVmConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            socket_path,
            created_at: Utc::now(),
            config,
            runtime: Mutex::new(VmRuntime::default()),
        })
    }

    /// Spawns the subprocess unless it is already live.
    ///
    /// Serialised by the record lock, so concurrent callers cannot
    /// double-spawn onto the same socket.
    ///
    /// # Errors
    /// Propagates spawn failures from the supervisor.
    pub async fn ensure_started(self: &Arc<Self>, settings: &VmmSettings) -> Result<(), VmmError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.process.as_ref().is_some_and(VmProcess::is_running) {
            return Ok(());
        }
        let process = supervisor::spawn(settings, &self.socket_path).await?;
        runtime.proxy = Some(VmProxy::new(self.socket_path.clone()));
        runtime.process = Some(process.clone());
        drop(runtime);
        self.watch_exit(process);
        Ok(())
    }

    /// Clears the runtime handles once `process` exits. The record stays
    /// registered, so clients see it as not-running until they delete it.
    fn watch_exit(self: &Arc<Self>, process: VmProcess) {
        let record = Arc::clone(self);
        tokio::spawn(async move {
            process.exited().await;
            let mut runtime = record.runtime.lock().await;
            let same = runtime
                .process
                .as_ref()
                .is_some_and(|p| p.pid() == process.pid());
            if same {
                runtime.process = None;
                runtime.proxy = None;
                tracing::warn!(
                    vm = %record.name,
                    pid = process.pid(),
                    "subprocess exited; record marked stopped"
                );
            }
        });
    }

    /// Stops the subprocess (if any) and clears the runtime handles.
    ///
    /// A record that was never started, or whose subprocess already died,
    /// is a no-op.
    pub async fn shutdown(&self, settings: &VmmSettings, force: bool) {
        let process = {
            let mut runtime = self.runtime.lock().await;
            runtime.proxy = None;
            runtime.process.take()
        };
        if let Some(process) = process {
            supervisor::stop(&process, &self.socket_path, settings, force).await;
        }
    }

    /// Whether the subprocess is currently live.
    pub async fn is_running(&self) -> bool {
        let runtime = self.runtime.lock().await;
        runtime.process.as_ref().is_some_and(VmProcess::is_running)
    }

    /// Live pid, if any.
    pub async fn pid(&self) -> Option<u32> {
        let runtime = self.runtime.lock().await;
        runtime
            .process
            .as_ref()
            .filter(|p| p.is_running())
            .map(VmProcess::pid)
    }

    /// Clone of the proxy handle while the subprocess is live.
    pub async fn proxy(&self) -> Option<VmProxy> {
        let runtime = self.runtime.lock().await;
        if runtime.process.as_ref().is_some_and(VmProcess::is_running) {
            runtime.proxy.clone()
        } else {
            None
        }
    }

    /// Console pipe handles while the subprocess is live.
    pub async fn console_pipes(&self) -> Option<(ConsoleIn, ConsoleOut)> {
        let runtime = self.runtime.lock().await;
        runtime
            .process
            .as_ref()
            .filter(|p| p.is_running())
            .map(VmProcess::console_pipes)
    }

    /// Status snapshot; samples CPU and memory when `sample_stats` is set
    /// and the subprocess is live.
    pub async fn info(&self, sample_stats: bool) -> MicroVmInfo {
        let pid = self.pid().await;
        let running = pid.is_some();
        let stats = match pid {
            Some(pid) if sample_stats => nestbox_vmm::stats::sample(pid).await,
            _ => nestbox_vmm::ProcessStats::default(),
        };
        MicroVmInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            running,
            pid,
            created_at: self.created_at,
            config: self.config.clone(),
            cpu_percent: (stats.cpu_percent > 0.0).then_some(stats.cpu_percent),
            memory_used_mb: (stats.memory_mb > 0).then_some(stats.memory_mb),
        }
    }
}

#[cfg(test)]
mod tests {
    use nestbox_core::MicroVmConfig;

    use super::*;

    fn stopped_record() -> Arc<MicroVm> {
        MicroVm::new(
            VmId::new("vm-1700000000-1"),
            "web",
            PathBuf::from("/tmp/firecracker-vm-1700000000-1.socket"),
            Some(MicroVmConfig::new("/k", "/r")),
        )
    }

    #[tokio::test]
    async fn stopped_record_has_no_runtime_handles() {
        let vm = stopped_record();
        assert!(!vm.is_running().await);
        assert!(vm.pid().await.is_none());
        assert!(vm.proxy().await.is_none());
        assert!(vm.console_pipes().await.is_none());
    }

    #[tokio::test]
    async fn stopped_record_info_reflects_identity_and_config() {
        let vm = stopped_record();
        let info = vm.info(true).await;
        assert_eq!(info.id, vm.id);
        assert_eq!(info.name, "web");
        assert!(!info.running);
        assert!(info.pid.is_none());
        assert!(info.cpu_percent.is_none());
        assert_eq!(info.config.as_ref().map(|c| c.vcpus), Some(1));
    }

    #[tokio::test]
    async fn shutdown_of_a_stopped_record_is_a_no_op() {
        let vm = stopped_record();
        vm.shutdown(&VmmSettings::default(), false).await;
        assert!(!vm.is_running().await);
    }
}
