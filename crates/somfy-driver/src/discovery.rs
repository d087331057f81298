//! 电机发现
//!
//! 广播 `DISCOVER_ALL`，等待监听窗口，然后读出传输中缓冲的全部 `HERE_IS_MOTOR` 应答。

use std::time::Duration;

use somfy_link::{Clock, SerialTransport, SomfyLink};
use somfy_protocol::{DiscoverAllCommand, HereIsMotor, ID_HERE_IS_MOTOR, MAX_PAYLOAD_LEN};
use tracing::{debug, trace};

use crate::{BridgeConfig, DriverError, InsertOutcome, Registry};

/// 单次发现最多处理的应答数（防止线路噪声导致无限读取）
const MAX_REPLIES_PER_ATTEMPT: usize = 32;

/// 执行一次发现，返回新插入的设备数
///
/// 损坏或超时的应答被跳过；只有传输故障会返回错误。
pub fn discover<T, C>(
    link: &mut SomfyLink<T, C>,
    registry: &mut Registry,
    config: &BridgeConfig,
) -> Result<usize, DriverError>
where
    T: SerialTransport,
    C: Clock,
{
    link.send_frame(&DiscoverAllCommand.to_frame())?;
    link.sleep_ms(config.discovery_listen_ms);

    let budget = Duration::from_millis(config.read_budget_ms);
    let mut inserted = 0;
    let mut replies = 0;
    while link.has_pending_input() && replies < MAX_REPLIES_PER_ATTEMPT {
        replies += 1;
        let frame = match link.receive_frame(ID_HERE_IS_MOTOR, budget, MAX_PAYLOAD_LEN) {
            Ok(frame) => frame,
            Err(e) if e.is_recoverable() => {
                debug!("Skipping discovery reply: {}", e);
                continue;
            },
            Err(e) => return Err(e.into()),
        };
        let reply = match HereIsMotor::try_from(&frame) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Malformed HERE_IS_MOTOR: {}", e);
                continue;
            },
        };
        let now = link.now_ms();
        match registry.insert(reply.address, now) {
            InsertOutcome::Inserted(_) => inserted += 1,
            InsertOutcome::Duplicate => trace!("Motor {} already known", reply.address),
            InsertOutcome::Full => {},
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use somfy_link::{ManualClock, MockTransport, SimulatedBus, SimulatedMotor};
    use somfy_protocol::WireAddress;

    #[test]
    fn test_discover_broadcast_and_listen_window() {
        let transport = MockTransport::new();
        let clock = ManualClock::new(0);
        let mut link = SomfyLink::new(transport.clone(), clock.clone());
        let mut registry = Registry::new();

        let found = discover(&mut link, &mut registry, &BridgeConfig::default()).unwrap();
        assert_eq!(found, 0);
        assert_eq!(clock.now_ms(), 100);
        assert_eq!(
            transport.written(),
            vec![0xBF, 0xF4, 0xFF, 0x80, 0x80, 0x80, 0x00, 0x00, 0x00, 0x04, 0x32]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_discover_skips_corrupt_and_duplicates() {
        let clock = ManualClock::new(0);
        let bus = SimulatedBus::new(clock.clone());
        let a = WireAddress::new(0x30, 0x00, 0x00);
        let b = WireAddress::new(0x10, 0x00, 0x00);
        bus.add_motor(SimulatedMotor::new(a, 0, 10));
        bus.add_motor(SimulatedMotor::new(b, 0, 10));
        let mut link = SomfyLink::new(bus.clone(), clock);
        let mut registry = Registry::new();
        let config = BridgeConfig::default();

        // 第一个应答（b）校验和出错
        bus.corrupt_next_replies(1);
        assert_eq!(discover(&mut link, &mut registry, &config).unwrap(), 1);
        assert!(registry.find(a).is_some());

        assert_eq!(discover(&mut link, &mut registry, &config).unwrap(), 1);
        assert_eq!(discover(&mut link, &mut registry, &config).unwrap(), 0);

        let order: Vec<_> = registry.addresses().collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn test_discover_respects_capacity() {
        let clock = ManualClock::new(0);
        let bus = SimulatedBus::new(clock.clone());
        for a1 in 1..=6 {
            bus.add_motor(SimulatedMotor::new(WireAddress::new(a1, 0, 0), 0, 10));
        }
        let mut link = SomfyLink::new(bus, clock);
        let mut registry = Registry::new();

        let found = discover(&mut link, &mut registry, &BridgeConfig::default()).unwrap();
        assert_eq!(found, crate::MAX_DEVICES);
        assert!(registry.is_full());
    }
}
