//! 状态轮询
//!
//! 逐个设备发送 `REPORT_MOTOR_STATUS` 并等待 `HERE_IS_POSITION`，
//! 每个设备最多尝试 [`BridgeConfig::status_retries`] 次，接受第一个有效应答。

use smallvec::SmallVec;
use somfy_link::{Clock, SerialTransport, SomfyLink};
use somfy_protocol::{
    HereIsPosition, ID_HERE_IS_POSITION, MAX_PAYLOAD_LEN, MotorStatusRequest, WireAddress,
};
use tracing::{debug, info, trace, warn};

use crate::{BridgeConfig, Device, DriverError, MAX_DEVICES, Registry};

/// 一轮轮询的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// 成功读取的设备数
    pub responded: usize,
    /// 位置发生变化的设备
    pub changed: SmallVec<[WireAddress; MAX_DEVICES]>,
    /// 从离线恢复的设备
    pub came_online: SmallVec<[WireAddress; MAX_DEVICES]>,
    /// 本轮翻转为离线的设备
    pub went_offline: SmallVec<[WireAddress; MAX_DEVICES]>,
}

impl PollSummary {
    pub fn any_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    /// 是否有上下线变化
    pub fn has_transitions(&self) -> bool {
        !self.came_online.is_empty() || !self.went_offline.is_empty()
    }
}

/// 状态轮询器
#[derive(Debug, Clone)]
pub struct StatusPoller {
    config: BridgeConfig,
}

impl StatusPoller {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// 轮询所有设备
    pub fn poll_all<T, C>(
        &self,
        link: &mut SomfyLink<T, C>,
        registry: &mut Registry,
    ) -> Result<PollSummary, DriverError>
    where
        T: SerialTransport,
        C: Clock,
    {
        let mut summary = PollSummary::default();
        for device in registry.iter_mut() {
            self.poll_device(link, device, &mut summary)?;
        }
        Ok(summary)
    }

    fn poll_device<T, C>(
        &self,
        link: &mut SomfyLink<T, C>,
        device: &mut Device,
        summary: &mut PollSummary,
    ) -> Result<(), DriverError>
    where
        T: SerialTransport,
        C: Clock,
    {
        match self.read_position(link, device.address)? {
            Some(reply) => {
                let update = device.apply_position(reply.percentage, link.now_ms());
                summary.responded += 1;
                if update.changed {
                    debug!("Motor {} position {}%", device.address, reply.percentage);
                    summary.changed.push(device.address);
                }
                if update.came_online {
                    info!("Motor {} is back online", device.address);
                    summary.came_online.push(device.address);
                }
            },
            None => {
                if device.mark_unreachable(link.now_ms(), self.config.offline_timeout_ms) {
                    warn!(
                        "Motor {} offline: no status for {} ms",
                        device.address, self.config.offline_timeout_ms
                    );
                    summary.went_offline.push(device.address);
                }
            },
        }
        Ok(())
    }

    /// 读取一个设备的位置，所有尝试失败时返回 `None`
    ///
    /// 来源地址不是被查询设备的应答被忽略。
    pub fn read_position<T, C>(
        &self,
        link: &mut SomfyLink<T, C>,
        address: WireAddress,
    ) -> Result<Option<HereIsPosition>, DriverError>
    where
        T: SerialTransport,
        C: Clock,
    {
        let request = MotorStatusRequest::new(address).to_frame();
        let budget = self.config.read_budget();

        for attempt in 1..=self.config.status_retries {
            link.send_frame(&request)?;
            link.sleep_ms(self.config.status_retry_delay_ms);

            let frame = match link.receive_frame(ID_HERE_IS_POSITION, budget, MAX_PAYLOAD_LEN) {
                Ok(frame) => frame,
                Err(e) if e.is_recoverable() => {
                    trace!("Status attempt {} for {} failed: {}", attempt, address, e);
                    continue;
                },
                Err(e) => return Err(e.into()),
            };
            match HereIsPosition::try_from(&frame) {
                Ok(reply) if reply.address == address => return Ok(Some(reply)),
                Ok(reply) => {
                    debug!("Ignoring status from {} while polling {}", reply.address, address);
                },
                Err(e) => debug!("Malformed HERE_IS_POSITION: {}", e),
            }
        }
        debug!(
            "No status from {} after {} attempts",
            address, self.config.status_retries
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use somfy_link::{LinkError, ManualClock, SimulatedBus, SimulatedMotor};
    use somfy_protocol::MessageId;

    const A: WireAddress = WireAddress::new(0x10, 0x20, 0x30);
    const B: WireAddress = WireAddress::new(0x20, 0x20, 0x30);

    fn bus_setup() -> (SomfyLink<SimulatedBus<ManualClock>, ManualClock>, SimulatedBus<ManualClock>, ManualClock) {
        let clock = ManualClock::new(0);
        let bus = SimulatedBus::new(clock.clone());
        bus.add_motor(SimulatedMotor::new(A, 25, 10));
        bus.add_motor(SimulatedMotor::new(B, 60, 10));
        (SomfyLink::new(bus.clone(), clock.clone()), bus, clock)
    }

    #[test]
    fn test_poll_all_updates_positions() {
        let (mut link, _, _) = bus_setup();
        let mut registry = Registry::from_addresses([A, B], 0);
        let poller = StatusPoller::new(&BridgeConfig::default());

        let summary = poller.poll_all(&mut link, &mut registry).unwrap();
        assert_eq!(summary.responded, 2);
        assert_eq!(summary.changed.as_slice(), &[A, B]);
        assert_eq!(registry.get(0).unwrap().current_percentage, Some(25));
        assert_eq!(registry.get(1).unwrap().current_percentage, Some(60));

        let summary = poller.poll_all(&mut link, &mut registry).unwrap();
        assert!(!summary.any_changed());
    }

    #[test]
    fn test_retries_then_gives_up() {
        let (mut link, bus, clock) = bus_setup();
        bus.set_online(A, false);
        let poller = StatusPoller::new(&BridgeConfig::default());

        assert_eq!(poller.read_position(&mut link, A).unwrap(), None);
        assert_eq!(bus.count_sent(MessageId::ReportMotorStatus), 5);
        // 每次尝试：80ms 等待 + 30ms 读预算
        assert_eq!(clock.now_ms(), 5 * 110);
    }

    #[test]
    fn test_retry_recovers_from_corrupt_reply() {
        let (mut link, bus, _) = bus_setup();
        bus.corrupt_next_replies(2);
        let poller = StatusPoller::new(&BridgeConfig::default());

        let reply = poller.read_position(&mut link, B).unwrap().unwrap();
        assert_eq!(reply.percentage, 60);
        assert_eq!(bus.count_sent(MessageId::ReportMotorStatus), 3);
    }

    /// 对任何请求都以另一台电机的位置应答
    #[derive(Default)]
    struct WrongMotorReplier {
        rx: VecDeque<u8>,
    }

    impl SerialTransport for WrongMotorReplier {
        fn available(&mut self) -> usize {
            self.rx.len()
        }

        fn read(&mut self) -> Result<u8, LinkError> {
            self.rx.pop_front().ok_or(LinkError::Timeout)
        }

        fn write(&mut self, _byte: u8) -> Result<(), LinkError> {
            Ok(())
        }

        fn flush(&mut self) -> Result<(), LinkError> {
            let reply = HereIsPosition {
                address: B,
                percentage: 10,
                ticks: 0,
            };
            self.rx.extend(reply.to_frame(0x08).encode()?);
            Ok(())
        }

        fn drain(&mut self) {
            self.rx.clear();
        }
    }

    #[test]
    fn test_reply_from_other_motor_is_ignored() {
        let mut link = SomfyLink::new(WrongMotorReplier::default(), ManualClock::new(0));
        let mut registry = Registry::from_addresses([A], 0);
        let poller = StatusPoller::new(&BridgeConfig::default());

        let summary = poller.poll_all(&mut link, &mut registry).unwrap();
        assert_eq!(summary.responded, 0);
        assert_eq!(registry.get(0).unwrap().current_percentage, None);
    }

    #[test]
    fn test_offline_flips_once_across_polls() {
        let (mut link, bus, clock) = bus_setup();
        let mut registry = Registry::from_addresses([A], 0);
        let poller = StatusPoller::new(&BridgeConfig::default());
        poller.poll_all(&mut link, &mut registry).unwrap();

        bus.set_online(A, false);
        let mut offline_flips = 0;
        for _ in 0..20 {
            clock.advance(6_000);
            let summary = poller.poll_all(&mut link, &mut registry).unwrap();
            offline_flips += summary.went_offline.len();
        }
        assert_eq!(offline_flips, 1);
        assert!(!registry.get(0).unwrap().online);

        bus.set_online(A, true);
        let summary = poller.poll_all(&mut link, &mut registry).unwrap();
        assert_eq!(summary.came_online.as_slice(), &[A]);
        assert!(summary.has_transitions());
    }
}
