//! 模式控制器
//!
//! [`Bridge`] 持有所有可变状态，由外部循环反复调用 [`Bridge::tick`]：
//!
//! - **Discovery**: 每个周期执行一次发现；确认或注册表已满时持久化注册表和 Joining 模式，然后要求重启
//! - **Joining**: 等待入网，期间轮询位置（仅用于显示）
//! - **Operation**: 处理网络请求、下发指令、轮询、卡住检测、发布通道值、上报
//!
//! 模式写入存储并提交成功之后，内存中的模式才会改变。

use std::time::Duration;

use somfy_link::{Clock, SerialTransport, SomfyLink};
use tracing::{info, trace, warn};

use crate::mesh::{apply_request, channel_value};
use crate::persist::{load_addresses, load_mode, save_mode, save_registry};
use crate::{
    BridgeConfig, ChannelId, CommandProcessor, ControlPanel, DriverError, Gesture, MeshNetwork,
    Mode, Registry, ReportScheduler, StatusDisplay, StatusPoller, StatusView, Store, discover,
};

/// 一个周期的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 等待指定时间后继续下一个周期
    Continue { next_tick_in: Duration },
    /// 需要重启（由调用方用同一存储重新启动）
    Restart,
}

/// 桥接器的外部协作者
///
/// 启动时交给 [`Bridge::boot`]，重启时通过 [`Bridge::into_parts`] 取回。
pub struct BridgeParts<T, C, S, M> {
    pub link: SomfyLink<T, C>,
    pub store: S,
    pub mesh: M,
    pub panel: Box<dyn ControlPanel>,
    pub display: Box<dyn StatusDisplay>,
}

/// 桥接器
pub struct Bridge<T, C, S, M> {
    link: SomfyLink<T, C>,
    store: S,
    mesh: M,
    panel: Box<dyn ControlPanel>,
    display: Box<dyn StatusDisplay>,
    config: BridgeConfig,
    mode: Mode,
    registry: Registry,
    commands: CommandProcessor,
    poller: StatusPoller,
    reports: ReportScheduler,
    last_poll_at: Option<u64>,
}

impl<T, C, S, M> Bridge<T, C, S, M>
where
    T: SerialTransport,
    C: Clock,
    S: Store,
    M: MeshNetwork,
{
    /// 从存储恢复模式和注册表并启动
    ///
    /// Joining/Operation 从存储加载注册表；Discovery 从空注册表开始。
    pub fn boot(parts: BridgeParts<T, C, S, M>, config: BridgeConfig) -> Result<Self, DriverError> {
        let BridgeParts {
            link,
            mut store,
            mesh,
            panel,
            display,
        } = parts;

        let now = link.now_ms();
        let mode = load_mode(&mut store)?;
        let registry = match mode {
            Mode::Discovery => Registry::new(),
            Mode::Joining | Mode::Operation => {
                Registry::from_addresses(load_addresses(&mut store)?, now)
            },
        };
        info!("Booting in {} mode with {} motor(s)", mode, registry.len());

        let mut reports = ReportScheduler::new(&config);
        reports.mark_activity(now);

        Ok(Self {
            link,
            store,
            mesh,
            panel,
            display,
            commands: CommandProcessor::new(&config),
            poller: StatusPoller::new(&config),
            reports,
            config,
            mode,
            registry,
            last_poll_at: None,
        })
    }

    /// 取回外部协作者（用于重启）
    pub fn into_parts(self) -> BridgeParts<T, C, S, M> {
        BridgeParts {
            link: self.link,
            store: self.store,
            mesh: self.mesh,
            panel: self.panel,
            display: self.display,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn link(&self) -> &SomfyLink<T, C> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut SomfyLink<T, C> {
        &mut self.link
    }

    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut M {
        &mut self.mesh
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn reports(&self) -> &ReportScheduler {
        &self.reports
    }

    /// 当前显示内容
    pub fn status_view(&self) -> StatusView {
        let now = self.link.now_ms();
        let screen_on = self
            .reports
            .last_activity()
            .is_some_and(|t| now.saturating_sub(t) < self.config.screen_idle_ms);
        StatusView::build(self.mode, &self.registry, screen_on)
    }

    /// 等待一个周期结果给出的时间
    pub fn wait(&self, outcome: TickOutcome) {
        if let TickOutcome::Continue { next_tick_in } = outcome {
            self.link.sleep_ms(next_tick_in.as_millis() as u64);
        }
    }

    /// 执行一个周期
    pub fn tick(&mut self) -> Result<TickOutcome, DriverError> {
        let outcome = match self.mode {
            Mode::Discovery => self.discovery_tick()?,
            Mode::Joining | Mode::Operation => self.network_tick()?,
        };
        let view = self.status_view();
        self.display.render(&view);
        Ok(outcome)
    }

    fn discovery_tick(&mut self) -> Result<TickOutcome, DriverError> {
        let found = discover(&mut self.link, &mut self.registry, &self.config)?;
        if found > 0 {
            self.reports.mark_activity(self.link.now_ms());
        }

        let confirmed = !self.registry.is_empty() && self.panel.confirm_pressed();
        if confirmed || self.registry.is_full() {
            info!(
                "Discovery finished with {} motor(s){}",
                self.registry.len(),
                if confirmed { " (confirmed)" } else { " (registry full)" }
            );
            save_registry(&mut self.store, &self.registry)?;
            self.set_mode(Mode::Joining)?;
            return Ok(TickOutcome::Restart);
        }
        Ok(self.continue_in(self.config.discovery_tick_ms))
    }

    fn network_tick(&mut self) -> Result<TickOutcome, DriverError> {
        let now = self.link.now_ms();
        if self.panel.confirm_pressed() {
            self.reports.mark_activity(now);
        }
        match self.panel.take_gesture() {
            Some(Gesture::Learn) => {
                info!("Starting network inclusion");
                self.mesh.request_inclusion();
            },
            Some(Gesture::FactoryReset) => return self.factory_reset(),
            None => {},
        }

        if self.mode == Mode::Operation && !self.mesh.is_member() {
            warn!("Lost network membership");
            self.set_mode(Mode::Joining)?;
            return Ok(self.continue_in(self.config.operation_tick_ms));
        }
        if self.mode == Mode::Joining {
            if self.mesh.is_member() {
                self.set_mode(Mode::Operation)?;
                return Ok(self.continue_in(self.config.operation_tick_ms));
            }
            self.mesh.request_inclusion();
        }

        let mut poll_due = self
            .last_poll_at
            .is_none_or(|t| now.saturating_sub(t) >= self.config.poll_interval_ms);

        if self.mode == Mode::Operation {
            self.apply_channel_requests(now);
            let tick = self.commands.tick(&mut self.link, &mut self.registry)?;
            if tick.active {
                self.reports.mark_activity(now);
                poll_due = true;
            }
        }

        if poll_due {
            self.last_poll_at = Some(now);
            let summary = self.poller.poll_all(&mut self.link, &mut self.registry)?;
            if summary.any_changed() {
                self.reports.mark_activity(self.link.now_ms());
            }
            if self.mode == Mode::Operation {
                self.commands.check_jam(&mut self.registry, self.link.now_ms());
            }
        }

        // Joining 期间的上报标志保留到进入 Operation 后再上报
        if self.mode == Mode::Operation {
            let important = self.registry.take_report_needed();
            self.publish_channels();
            let now = self.link.now_ms();
            self.reports
                .notify(important, now, &mut self.mesh, self.registry.len());
        }
        Ok(self.continue_in(self.config.operation_tick_ms))
    }

    fn apply_channel_requests(&mut self, now: u64) {
        for channel in ChannelId::all(self.registry.len()) {
            while let Some(request) = self.mesh.take_request(channel) {
                apply_request(&mut self.registry, channel, request, now);
                self.reports.mark_activity(now);
            }
        }
    }

    fn publish_channels(&mut self) {
        for channel in ChannelId::all(self.registry.len()) {
            self.mesh.publish(channel, channel_value(&self.registry, channel));
        }
    }

    /// 清空注册表，持久化空注册表和 Discovery 模式，然后要求重启
    fn factory_reset(&mut self) -> Result<TickOutcome, DriverError> {
        warn!("Factory reset requested");
        self.registry.clear();
        save_registry(&mut self.store, &self.registry)?;
        self.set_mode(Mode::Discovery)?;
        Ok(TickOutcome::Restart)
    }

    /// 持久化并切换模式
    fn set_mode(&mut self, mode: Mode) -> Result<(), DriverError> {
        save_mode(&mut self.store, mode)?;
        info!("Mode {} -> {}", self.mode, mode);
        self.mode = mode;
        Ok(())
    }

    fn continue_in(&self, ms: u64) -> TickOutcome {
        trace!("Next {} tick in {} ms", self.mode, ms);
        TickOutcome::Continue {
            next_tick_in: Duration::from_millis(ms),
        }
    }
}
