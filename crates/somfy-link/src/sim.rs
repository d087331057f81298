//! 模拟电机总线
//!
//! 在 [`SerialTransport`] 之后模拟若干 Somfy 电机：
//! 解析写入的请求帧，按时钟推进电机位置，并把应答字节放入接收队列。
//! 用于驱动层集成测试和主机端演示。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use somfy_protocol::{
    Frame, HereIsMotor, HereIsPosition, MAX_PERCENTAGE, MessageId, MoveCommand, MoveTarget,
    MotorStatusRequest, StopCommand, WireAddress, decode_frame,
};
use tracing::{debug, trace};

use crate::{Clock, LinkError, SerialTransport};

/// 模拟电机默认节点类型
const SIM_NODE_TYPE: u8 = 0x08;

/// 模拟电机
#[derive(Debug, Clone)]
pub struct SimulatedMotor {
    pub address: WireAddress,
    /// 当前位置（千分之一百分比）
    position_milli: u32,
    /// 目标位置（千分之一百分比）
    target_milli: u32,
    /// 移动速度（百分比/秒）
    pub speed_pct_per_s: u32,
    /// 是否响应总线
    pub online: bool,
    /// 卡住：接受指令但不移动
    pub jammed: bool,
}

impl SimulatedMotor {
    pub fn new(address: WireAddress, position: u8, speed_pct_per_s: u32) -> Self {
        let milli = u32::from(position.min(MAX_PERCENTAGE)) * 1000;
        Self {
            address,
            position_milli: milli,
            target_milli: milli,
            speed_pct_per_s,
            online: true,
            jammed: false,
        }
    }

    /// 当前位置百分比（四舍五入）
    pub fn position(&self) -> u8 {
        ((self.position_milli + 500) / 1000) as u8
    }

    /// 是否在移动
    pub fn is_moving(&self) -> bool {
        self.position_milli != self.target_milli
    }

    fn advance(&mut self, elapsed_ms: u64) {
        if self.jammed || !self.is_moving() {
            return;
        }
        let step = (u64::from(self.speed_pct_per_s) * elapsed_ms).min(u64::from(u32::MAX)) as u32;
        if self.position_milli < self.target_milli {
            self.position_milli = (self.position_milli + step).min(self.target_milli);
        } else {
            self.position_milli = self.position_milli.saturating_sub(step).max(self.target_milli);
        }
    }
}

#[derive(Debug, Default)]
struct BusState {
    motors: Vec<SimulatedMotor>,
    rx: VecDeque<u8>,
    pending_tx: Vec<u8>,
    sent: Vec<Frame>,
    last_update_ms: Option<u64>,
    corrupt_replies: usize,
}

/// 模拟总线（克隆共享同一总线状态）
#[derive(Debug, Clone)]
pub struct SimulatedBus<C> {
    state: Arc<Mutex<BusState>>,
    clock: C,
}

impl<C: Clock> SimulatedBus<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 按时钟推进所有电机
    fn update(&self) -> MutexGuard<'_, BusState> {
        let now = self.clock.now_ms();
        let mut state = self.state();
        let elapsed = state.last_update_ms.map_or(0, |last| now.saturating_sub(last));
        state.last_update_ms = Some(now);
        for motor in &mut state.motors {
            motor.advance(elapsed);
        }
        state
    }

    /// 添加电机
    pub fn add_motor(&self, motor: SimulatedMotor) {
        self.update().motors.push(motor);
    }

    /// 电机当前位置
    pub fn position(&self, address: WireAddress) -> Option<u8> {
        self.update()
            .motors
            .iter()
            .find(|m| m.address == address)
            .map(SimulatedMotor::position)
    }

    /// 设置电机是否在线
    pub fn set_online(&self, address: WireAddress, online: bool) {
        self.with_motor(address, |m| m.online = online);
    }

    /// 设置电机是否卡住
    pub fn set_jammed(&self, address: WireAddress, jammed: bool) {
        self.with_motor(address, |m| m.jammed = jammed);
    }

    /// 让接下来 `count` 个应答的校验和出错
    pub fn corrupt_next_replies(&self, count: usize) {
        self.state().corrupt_replies = count;
    }

    /// 电机快照
    pub fn motors(&self) -> Vec<SimulatedMotor> {
        self.update().motors.clone()
    }

    /// 已收到的请求帧
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.state().sent.clone()
    }

    /// 统计某类请求帧的数量
    pub fn count_sent(&self, id: MessageId) -> usize {
        let raw: u8 = id.into();
        self.state().sent.iter().filter(|f| f.msg_type == raw).count()
    }

    /// 清空请求帧记录
    pub fn clear_sent(&self) {
        self.state().sent.clear();
    }

    fn with_motor(&self, address: WireAddress, f: impl FnOnce(&mut SimulatedMotor)) {
        let mut state = self.update();
        if let Some(motor) = state.motors.iter_mut().find(|m| m.address == address) {
            f(motor);
        }
    }
}

impl BusState {
    fn push_reply(&mut self, frame: &Frame) {
        let Ok(bytes) = frame.encode() else {
            return;
        };
        let mut bytes = bytes.to_vec();
        if self.corrupt_replies > 0 {
            self.corrupt_replies -= 1;
            if let Some(last) = bytes.last_mut() {
                *last ^= 0x5A;
            }
        }
        self.rx.extend(bytes);
    }

    fn handle(&mut self, frame: Frame) {
        trace!("Simulated bus got frame 0x{:02X}", frame.msg_type);
        match frame.message_id() {
            Some(MessageId::DiscoverAll) => {
                // 应答顺序与地址顺序无关
                let replies: Vec<Frame> = self
                    .motors
                    .iter()
                    .rev()
                    .filter(|m| m.online)
                    .map(|m| {
                        HereIsMotor {
                            address: m.address,
                            node_type: SIM_NODE_TYPE,
                        }
                        .to_frame()
                    })
                    .collect();
                for reply in &replies {
                    self.push_reply(reply);
                }
            },
            Some(MessageId::ReportMotorStatus) => {
                let Ok(request) = MotorStatusRequest::try_from(&frame) else {
                    return;
                };
                let reply = self
                    .motors
                    .iter()
                    .find(|m| m.online && m.address == request.address)
                    .map(|m| {
                        HereIsPosition {
                            address: m.address,
                            percentage: m.position(),
                            ticks: (m.position_milli / 10) as u16,
                        }
                        .to_frame(SIM_NODE_TYPE)
                    });
                if let Some(reply) = reply {
                    self.push_reply(&reply);
                }
            },
            Some(MessageId::MoveTo) => {
                let Ok(command) = MoveCommand::try_from(&frame) else {
                    return;
                };
                if let Some(motor) = self
                    .motors
                    .iter_mut()
                    .find(|m| m.online && m.address == command.address)
                {
                    let target = match command.target {
                        MoveTarget::OpenLimit => 0,
                        MoveTarget::CloseLimit => MAX_PERCENTAGE,
                        MoveTarget::Position(p) => p.min(MAX_PERCENTAGE),
                    };
                    debug!("Simulated motor {} moving to {}%", motor.address, target);
                    motor.target_milli = u32::from(target) * 1000;
                }
            },
            Some(MessageId::Stop) => {
                let Ok(command) = StopCommand::try_from(&frame) else {
                    return;
                };
                if let Some(motor) = self
                    .motors
                    .iter_mut()
                    .find(|m| m.online && m.address == command.address)
                {
                    motor.target_milli = motor.position_milli;
                }
            },
            _ => {},
        }
        self.sent.push(frame);
    }
}

impl<C: Clock> SerialTransport for SimulatedBus<C> {
    fn available(&mut self) -> usize {
        self.update().rx.len()
    }

    fn read(&mut self) -> Result<u8, LinkError> {
        self.update().rx.pop_front().ok_or(LinkError::Timeout)
    }

    fn write(&mut self, byte: u8) -> Result<(), LinkError> {
        self.update().pending_tx.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        let mut state = self.update();
        let pending = std::mem::take(&mut state.pending_tx);
        let mut offset = 0;
        while offset < pending.len() {
            match decode_frame(&pending[offset..]) {
                Ok((frame, used)) => {
                    offset += used;
                    state.handle(frame);
                },
                Err(_) => break,
            }
        }
        Ok(())
    }

    fn drain(&mut self) {
        self.update().rx.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, SomfyLink};
    use somfy_protocol::{DiscoverAllCommand, ID_HERE_IS_MOTOR, ID_HERE_IS_POSITION};

    const A: WireAddress = WireAddress::new(0x10, 0x20, 0x30);
    const B: WireAddress = WireAddress::new(0x05, 0x20, 0x30);

    fn setup() -> (SomfyLink<SimulatedBus<ManualClock>, ManualClock>, SimulatedBus<ManualClock>, ManualClock) {
        let clock = ManualClock::new(0);
        let bus = SimulatedBus::new(clock.clone());
        bus.add_motor(SimulatedMotor::new(A, 20, 10));
        bus.add_motor(SimulatedMotor::new(B, 80, 10));
        let link = SomfyLink::new(bus.clone(), clock.clone());
        (link, bus, clock)
    }

    #[test]
    fn test_discovery_replies() {
        let (mut link, _, _) = setup();
        link.send_frame(&DiscoverAllCommand.to_frame()).unwrap();

        let mut found = Vec::new();
        while link.has_pending_input() {
            let frame = link.receive(ID_HERE_IS_MOTOR).unwrap();
            found.push(HereIsMotor::try_from(&frame).unwrap().address);
        }
        assert_eq!(found, vec![B, A]);
    }

    #[test]
    fn test_motor_moves_over_time() {
        let (mut link, bus, clock) = setup();
        link.send_frame(&MoveCommand::new(A, MoveTarget::Position(50)).to_frame()).unwrap();

        clock.advance(1_000);
        assert_eq!(bus.position(A), Some(30));

        clock.advance(10_000);
        assert_eq!(bus.position(A), Some(50));

        link.send_frame(&MotorStatusRequest::new(A).to_frame()).unwrap();
        let frame = link.receive(ID_HERE_IS_POSITION).unwrap();
        assert_eq!(HereIsPosition::try_from(&frame).unwrap().percentage, 50);
    }

    #[test]
    fn test_jammed_and_offline_motors() {
        let (mut link, bus, clock) = setup();
        bus.set_jammed(A, true);
        link.send_frame(&MoveCommand::new(A, MoveTarget::OpenLimit).to_frame()).unwrap();
        clock.advance(5_000);
        assert_eq!(bus.position(A), Some(20));

        bus.set_online(B, false);
        link.send_frame(&MotorStatusRequest::new(B).to_frame()).unwrap();
        assert!(matches!(link.receive(ID_HERE_IS_POSITION), Err(LinkError::Timeout)));
        assert_eq!(bus.count_sent(MessageId::ReportMotorStatus), 1);
    }

    #[test]
    fn test_stop_holds_position() {
        let (mut link, bus, clock) = setup();
        link.send_frame(&MoveCommand::new(B, MoveTarget::CloseLimit).to_frame()).unwrap();
        clock.advance(500);
        link.send_frame(&StopCommand::new(B).to_frame()).unwrap();
        clock.advance(5_000);
        assert_eq!(bus.position(B), Some(85));
    }
}
