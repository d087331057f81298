//! 指令下发与卡住检测
//!
//! 每个周期对每个设备评估一次 [`Device::step`]，按结果发送停止帧或移动指令。
//! 移动指令重复发送以弥补线路丢帧；停止帧只发送一次，不再跟踪。

use somfy_link::{Clock, SerialTransport, SomfyLink};
use somfy_protocol::{MoveCommand, StopCommand};
use tracing::{debug, info, warn};

use crate::{BridgeConfig, CommandAction, DriverError, Registry};

/// 一个指令周期的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandTick {
    /// 周期开始时是否有设备处于指令中（视为活动）
    pub active: bool,
    /// 发出的移动指令数（不含重复发送）
    pub moves_issued: usize,
    /// 发出的停止帧数
    pub stops_issued: usize,
    /// 到位、超时或停止而结束的指令数
    pub resolved: usize,
}

/// 指令处理器
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    config: BridgeConfig,
}

impl CommandProcessor {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// 执行一个指令周期
    pub fn tick<T, C>(
        &self,
        link: &mut SomfyLink<T, C>,
        registry: &mut Registry,
    ) -> Result<CommandTick, DriverError>
    where
        T: SerialTransport,
        C: Clock,
    {
        let mut result = CommandTick {
            active: registry.any_commanded(),
            ..CommandTick::default()
        };

        for device in registry.iter_mut() {
            let now = link.now_ms();
            match device.step(now, &self.config) {
                CommandAction::None => {},
                CommandAction::Stop => {
                    info!("Stopping motor {}", device.address);
                    link.send_frame(&StopCommand::new(device.address).to_frame())?;
                    result.stops_issued += 1;
                    result.resolved += 1;
                },
                CommandAction::Satisfied => {
                    info!(
                        "Motor {} reached {}%",
                        device.address, device.commanded_percentage
                    );
                    result.resolved += 1;
                },
                CommandAction::TimedOut => {
                    warn!(
                        "Motor {} did not reach {}% within {} ms",
                        device.address, device.commanded_percentage, self.config.command_timeout_ms
                    );
                    result.resolved += 1;
                },
                CommandAction::Move(target) => {
                    debug!("Commanding motor {} to {:?}", device.address, target);
                    let frame = MoveCommand::new(device.address, target).to_frame();
                    for i in 0..self.config.move_repeat {
                        if i > 0 {
                            link.sleep_ms(self.config.move_gap_ms);
                        }
                        link.send_frame(&frame)?;
                    }
                    device.mark_sent();
                    result.moves_issued += 1;
                },
            }
        }
        Ok(result)
    }

    /// 卡住检测（每个轮询周期一次），返回本次解卡的设备数
    pub fn check_jam(&self, registry: &mut Registry, now: u64) -> usize {
        let mut count = 0;
        for device in registry.iter_mut() {
            if device.try_unjam(now, &self.config) {
                warn!(
                    "Motor {} looks jammed at {:?}, re-issuing command (attempt {}/{})",
                    device.address,
                    device.current_percentage,
                    device.unjam_attempts,
                    self.config.max_unjam_attempts
                );
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use somfy_link::{ManualClock, MockTransport};
    use somfy_protocol::{MoveTarget, WireAddress};

    const ADDR: WireAddress = WireAddress::new(0x10, 0x20, 0x30);

    fn setup() -> (SomfyLink<MockTransport, ManualClock>, MockTransport, Registry) {
        let transport = MockTransport::new();
        let link = SomfyLink::new(transport.clone(), ManualClock::new(0));
        let registry = Registry::from_addresses([ADDR], 0);
        (link, transport, registry)
    }

    #[test]
    fn test_move_sent_twice_with_gap() {
        let (mut link, transport, mut registry) = setup();
        let processor = CommandProcessor::new(&BridgeConfig::default());
        registry.get_mut(0).unwrap().set_target(50, 0);

        let tick = processor.tick(&mut link, &mut registry).unwrap();
        assert!(tick.active);
        assert_eq!(tick.moves_issued, 1);
        assert_eq!(link.now_ms(), 40);

        let frames = transport.written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frames[1]);
        let command = MoveCommand::try_from(&frames[0]).unwrap();
        assert_eq!(command.target, MoveTarget::Position(50));
        assert_eq!(frames[0].payload[7], 0xCD);
        assert!(registry.get(0).unwrap().command_sent);
    }

    #[test]
    fn test_no_resend_once_acked() {
        let (mut link, transport, mut registry) = setup();
        let processor = CommandProcessor::new(&BridgeConfig::default());
        registry.get_mut(0).unwrap().set_target(80, 0);
        processor.tick(&mut link, &mut registry).unwrap();

        registry.get_mut(0).unwrap().apply_position(30, link.now_ms());
        transport.take_written();
        let tick = processor.tick(&mut link, &mut registry).unwrap();
        assert!(tick.active);
        assert_eq!(tick.moves_issued, 0);
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_stop_is_fire_and_forget() {
        let (mut link, transport, mut registry) = setup();
        let processor = CommandProcessor::new(&BridgeConfig::default());
        let device = registry.get_mut(0).unwrap();
        device.set_target(80, 0);
        device.request_stop();

        let tick = processor.tick(&mut link, &mut registry).unwrap();
        assert_eq!(tick.stops_issued, 1);
        assert_eq!(tick.resolved, 1);
        let frames = transport.written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(StopCommand::try_from(&frames[0]).unwrap().address, ADDR);
        assert!(registry.take_report_needed());

        transport.take_written();
        let tick = processor.tick(&mut link, &mut registry).unwrap();
        assert!(!tick.active);
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_check_jam_forces_resend() {
        let (mut link, transport, mut registry) = setup();
        let processor = CommandProcessor::new(&BridgeConfig::default());
        registry.get_mut(0).unwrap().apply_position(20, 0);
        registry.get_mut(0).unwrap().set_target(0, 0);
        processor.tick(&mut link, &mut registry).unwrap();
        registry.get_mut(0).unwrap().command_acked = true;

        assert_eq!(processor.check_jam(&mut registry, 3_000), 0);
        assert_eq!(processor.check_jam(&mut registry, 4_000), 1);

        transport.take_written();
        processor.tick(&mut link, &mut registry).unwrap();
        let frames = transport.written_frames();
        assert_eq!(
            MoveCommand::try_from(&frames[0]).unwrap().target,
            MoveTarget::OpenLimit
        );
    }
}
