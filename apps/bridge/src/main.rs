//! # Somfy Bridge
//!
//! 桥接器的主机端运行器和调试工具。
//!
//! ```bash
//! # 在模拟电机总线上运行（模拟时钟，立即完成）
//! somfy-bridge run --config somfy-bridge.toml --ticks 500 --set 1=50 --set 0=up
//!
//! # 使用系统时钟实时运行，Ctrl+C 退出
//! somfy-bridge run --realtime --ticks 0
//!
//! # 编码/解码帧
//! somfy-bridge encode move 133FA0 50
//! somfy-bridge decode "FC F0 FF 80 80 80 5F C0 EC FB CD FF FF ..."
//!
//! # 查看持久化存储
//! somfy-bridge store bridge-store.bin
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use somfy_driver::display::DeviceLine;
use somfy_driver::persist::{load_addresses, load_mode};
use somfy_driver::{
    Bridge, BridgeParts, ChannelId, ChannelRequest, Clock, ManualClock, MeshNetwork, MoveTarget,
    SerialTransport, SomfyLink, Store, SystemClock, TickOutcome, TracingDisplay, WireAddress,
};
use somfy_link::{SimulatedBus, SimulatedMotor};
use somfy_protocol::{
    DiscoverAllCommand, Frame, HereIsMotor, HereIsPosition, MessageId, MotorStatusRequest,
    MoveCommand, StopCommand, decode_frame,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod file_store;
mod sim_mesh;

use config::AppConfig;
use file_store::FileStore;
use sim_mesh::{ScriptedPanel, SimulatedMesh, parse_request};

/// Somfy Bridge - 卷帘电机桥接器
#[derive(Parser, Debug)]
#[command(name = "somfy-bridge")]
#[command(about = "Host-side runner and tooling for the Somfy blind bridge", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志过滤（覆盖 RUST_LOG），如 `debug` 或 `somfy_driver=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在模拟电机总线上运行桥接器
    Run {
        /// 配置文件（不存在时使用默认值）
        #[arg(short, long, default_value = "somfy-bridge.toml")]
        config: PathBuf,

        /// 运行的周期数（0 表示一直运行）
        #[arg(long, default_value_t = 500)]
        ticks: u64,

        /// 网络请求，如 `1=50`、`0=up`、`2=stop`
        #[arg(long = "set", value_parser = parse_request)]
        requests: Vec<(ChannelId, ChannelRequest)>,

        /// 启动时按住按钮的时长（毫秒）
        #[arg(long)]
        hold_ms: Option<u64>,

        /// 使用系统时钟（默认使用模拟时钟）
        #[arg(long)]
        realtime: bool,
    },

    /// 编码请求帧并以十六进制输出
    #[command(subcommand)]
    Encode(EncodeCommand),

    /// 解码十六进制帧
    Decode {
        /// 帧字节，允许空格分隔
        hex: String,
    },

    /// 查看持久化存储文件
    Store {
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum EncodeCommand {
    /// 广播发现
    Discover,
    /// 查询位置
    Status { address: WireAddress },
    /// 移动到百分比（0 和 >= 99 使用限位）
    Move { address: WireAddress, percentage: u8 },
    /// 停止
    Stop { address: WireAddress },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid log filter")?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("somfy_bridge=info,somfy_driver=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            config,
            ticks,
            requests,
            hold_ms,
            realtime,
        } => {
            let app = AppConfig::load(&config)?;
            let options = RunOptions {
                ticks,
                requests,
                hold_ms,
            };
            if realtime {
                run(&app, options, SystemClock)
            } else {
                run(&app, options, ManualClock::new(0))
            }
        },
        Commands::Encode(cmd) => encode(cmd),
        Commands::Decode { hex } => decode(&hex),
        Commands::Store { path } => show_store(&path),
    }
}

struct RunOptions {
    ticks: u64,
    requests: Vec<(ChannelId, ChannelRequest)>,
    hold_ms: Option<u64>,
}

fn run<C>(app: &AppConfig, options: RunOptions, clock: C) -> Result<()>
where
    C: Clock + Clone + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let bus = SimulatedBus::new(clock.clone());
    for motor in &app.simulation.motors {
        let address = motor.wire_address()?;
        bus.add_motor(SimulatedMotor::new(address, motor.position, motor.speed));
        info!("Simulated motor {} at {}%", address, motor.position);
    }

    let mut mesh = SimulatedMesh::new(clock.clone(), app.simulation.join_after_ms);
    for (channel, request) in options.requests {
        mesh.queue(channel, request);
    }
    let panel = ScriptedPanel::new(clock.clone(), app.simulation.confirm_after_ms, options.hold_ms);

    let parts = BridgeParts {
        link: SomfyLink::with_config(bus, clock, app.bridge.link_config()),
        store: FileStore::open(&app.store.path)?,
        mesh,
        panel: Box::new(panel),
        display: Box::new(TracingDisplay::new()),
    };
    let bridge = Bridge::boot(parts, app.bridge.clone())?;
    let (bridge, tick) = run_loop(bridge, options.ticks, &running)?;

    info!(
        "Stopped after {} tick(s) at t={} ms in {} mode",
        tick,
        bridge.link().now_ms(),
        bridge.mode()
    );
    for device in bridge.registry().iter() {
        info!("  {}", DeviceLine::from_device(device));
    }
    info!(
        "Inclusion requests: {}, aggregate value: {:?}",
        bridge.mesh().inclusion_requests(),
        bridge.mesh().value(ChannelId::AGGREGATE).flatten()
    );
    Ok(())
}

/// 反复执行周期，直到达到 `ticks`（0 表示不限）或 `running` 被清除
///
/// 单个周期出错只记录日志，等待一个运行周期后继续；重启失败才返回错误。
fn run_loop<T, C, S, M>(
    mut bridge: Bridge<T, C, S, M>,
    ticks: u64,
    running: &AtomicBool,
) -> Result<(Bridge<T, C, S, M>, u64)>
where
    T: SerialTransport,
    C: Clock,
    S: Store,
    M: MeshNetwork,
{
    let mut tick = 0u64;
    while running.load(Ordering::SeqCst) && (ticks == 0 || tick < ticks) {
        tick += 1;
        match bridge.tick() {
            Ok(TickOutcome::Restart) => {
                info!("Restarting bridge");
                let config = bridge.config().clone();
                bridge = Bridge::boot(bridge.into_parts(), config)?;
            },
            Ok(outcome) => bridge.wait(outcome),
            Err(e) => {
                error!("Tick {} failed in {} mode: {}", tick, bridge.mode(), e);
                bridge.link().sleep_ms(bridge.config().operation_tick_ms);
            },
        }
    }
    Ok((bridge, tick))
}

fn encode(cmd: EncodeCommand) -> Result<()> {
    let frame = match cmd {
        EncodeCommand::Discover => DiscoverAllCommand.to_frame(),
        EncodeCommand::Status { address } => MotorStatusRequest::new(address).to_frame(),
        EncodeCommand::Move {
            address,
            percentage,
        } => MoveCommand::new(address, MoveTarget::for_percentage(percentage)).to_frame(),
        EncodeCommand::Stop { address } => StopCommand::new(address).to_frame(),
    };
    let bytes = frame.encode()?;
    println!("{}", hex::encode_upper(&bytes[..]));
    Ok(())
}

fn decode(input: &str) -> Result<()> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).context("Invalid hex input")?;
    let (frame, used) = decode_frame(&bytes)?;
    if used < bytes.len() {
        println!("⚠️  {} trailing byte(s) ignored", bytes.len() - used);
    }

    println!("Type:      0x{:02X} ({:?})", frame.msg_type, frame.message_id());
    println!("Node type: 0x{:02X}", frame.node_type);
    println!("Payload:   {}", hex::encode_upper(frame.payload_slice()));
    println!("{}", describe(&frame)?);
    Ok(())
}

fn describe(frame: &Frame) -> Result<String> {
    let text = match frame.message_id() {
        Some(MessageId::DiscoverAll) => "Discover all motors".to_string(),
        Some(MessageId::ReportMotorStatus) => {
            format!("Status request for {}", MotorStatusRequest::try_from(frame)?.address)
        },
        Some(MessageId::MoveTo) => {
            let command = MoveCommand::try_from(frame)?;
            format!("Move {} to {:?}", command.address, command.target)
        },
        Some(MessageId::Stop) => format!("Stop {}", StopCommand::try_from(frame)?.address),
        Some(MessageId::HereIsMotor) => {
            format!("Motor {} present", HereIsMotor::try_from(frame)?.address)
        },
        Some(MessageId::HereIsPosition) => {
            let reply = HereIsPosition::try_from(frame)?;
            format!(
                "Motor {} at {}% ({} ticks)",
                reply.address, reply.percentage, reply.ticks
            )
        },
        None => "Unknown message".to_string(),
    };
    Ok(text)
}

fn show_store(path: &Path) -> Result<()> {
    let mut store = FileStore::open(path)?;
    println!("Store:     {}", store.path().display());
    println!("Raw:       {}", hex::encode_upper(store.bytes()));
    println!("Mode:      {}", load_mode(&mut store)?);
    let addresses = load_addresses(&mut store)?;
    println!("Motors:    {}", addresses.len());
    for (i, address) in addresses.iter().enumerate() {
        println!("  [{}] {}", i, address);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use somfy_driver::persist::{save_mode, save_registry};
    use somfy_driver::{BridgeConfig, MemoryStore, Mode, Registry, StoreError};

    /// 提交总是失败的存储
    struct ReadOnlyStore(MemoryStore);

    impl Store for ReadOnlyStore {
        fn read(&mut self, offset: usize) -> Result<u8, StoreError> {
            self.0.read(offset)
        }

        fn write(&mut self, offset: usize, value: u8) -> Result<(), StoreError> {
            self.0.write(offset, value)
        }

        fn commit(&mut self) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("store is read-only")))
        }
    }

    #[test]
    fn test_run_loop_survives_failing_ticks() {
        let address = WireAddress::new(0x13, 0x3F, 0xA0);
        let mut memory = MemoryStore::new();
        save_registry(&mut memory, &Registry::from_addresses([address], 0)).unwrap();
        save_mode(&mut memory, Mode::Joining).unwrap();

        let clock = ManualClock::new(0);
        let bus = SimulatedBus::new(clock.clone());
        bus.add_motor(SimulatedMotor::new(address, 40, 10));
        // 立即入网：每个周期都尝试持久化 Operation 模式并失败
        let mesh = SimulatedMesh::new(clock.clone(), 0);
        let panel = ScriptedPanel::new(clock.clone(), u64::MAX / 2, None);

        let config = BridgeConfig::default();
        let parts = BridgeParts {
            link: SomfyLink::with_config(bus, clock.clone(), config.link_config()),
            store: ReadOnlyStore(memory.clone()),
            mesh,
            panel: Box::new(panel),
            display: Box::new(TracingDisplay::new()),
        };
        let bridge = Bridge::boot(parts, config.clone()).unwrap();

        let running = AtomicBool::new(true);
        let (bridge, ticks) = run_loop(bridge, 5, &running).unwrap();
        assert_eq!(ticks, 5);
        assert_eq!(bridge.mode(), Mode::Joining);
        assert_eq!(memory.commits(), 2);
        assert!(clock.now_ms() >= 5 * config.operation_tick_ms);
    }

    #[test]
    fn test_run_loop_stops_when_not_running() {
        let clock = ManualClock::new(0);
        let config = BridgeConfig::default();
        let parts = BridgeParts {
            link: SomfyLink::with_config(
                SimulatedBus::new(clock.clone()),
                clock.clone(),
                config.link_config(),
            ),
            store: MemoryStore::new(),
            mesh: SimulatedMesh::new(clock.clone(), 0),
            panel: Box::new(ScriptedPanel::new(clock.clone(), 0, None)),
            display: Box::new(TracingDisplay::new()),
        };
        let bridge = Bridge::boot(parts, config).unwrap();

        let running = AtomicBool::new(false);
        let (_, ticks) = run_loop(bridge, 5, &running).unwrap();
        assert_eq!(ticks, 0);
        assert_eq!(clock.now_ms(), 0);
    }
}
