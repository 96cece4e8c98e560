mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use helpers::{free_port, quiet_config, LineClient, TestResult};
use mailgate_lib::config::{Config, ProcessModel, ServiceListen};
use mailgate_lib::error::Result;
use mailgate_lib::worker::{Accepted, TaskSpawner, WorkerGuard, WorkerSpawner};
use mailgate_lib::{
    build_socket_set, ControlEvent, Dispatcher, DrainOutcome, GatewayContext, ServiceKind, ShutdownReport,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Running {
    ctx: Arc<GatewayContext>,
    control: mpsc::Sender<ControlEvent>,
    dispatcher: JoinHandle<ShutdownReport>,
    pop3_port: u16,
    imap_port: u16,
}

fn gateway_config() -> TestResult<(Config, u16, u16)> {
    let (pop3_port, imap_port) = (free_port()?, free_port()?);
    let mut cfg = quiet_config();
    cfg.pop3 = ServiceListen::on(&[format!("127.0.0.1:{pop3_port}")]);
    cfg.imap = ServiceListen::on(&[format!("127.0.0.1:{imap_port}")]);
    cfg.bypass_auth = true;
    cfg.timeout.drain_poll_millis = 10;
    cfg.timeout.drain_polls = 200;
    Ok((cfg, pop3_port, imap_port))
}

async fn start<F>(cfg: Config, pop3_port: u16, imap_port: u16, spawner: F) -> TestResult<Running>
where
    F: FnOnce(Arc<GatewayContext>) -> Arc<dyn WorkerSpawner>,
{
    let setup = build_socket_set(&cfg).await?;
    let ctx = Arc::new(GatewayContext::new(cfg));
    let (control, rx) = mpsc::channel(8);
    let dispatcher = Dispatcher::new(setup.sockets, Arc::clone(&ctx), spawner(Arc::clone(&ctx)), rx);
    let dispatcher = tokio::spawn(dispatcher.run());
    Ok(Running { ctx, control, dispatcher, pop3_port, imap_port })
}

fn tasks(ctx: Arc<GatewayContext>) -> Arc<dyn WorkerSpawner> {
    Arc::new(TaskSpawner::new(ctx))
}

async fn connect(port: u16) -> TestResult<LineClient<TcpStream>> {
    Ok(LineClient::new(TcpStream::connect(("127.0.0.1", port)).await?))
}

async fn wait_for_live(ctx: &GatewayContext, expected: usize) -> TestResult {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while ctx.workers().live() != expected {
        if tokio::time::Instant::now() > deadline {
            return Err(format!("live workers stuck at {}", ctx.workers().live()).into());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

#[tokio::test]
async fn serves_sessions_and_drains_on_terminate() -> TestResult {
    let (cfg, pop3_port, imap_port) = gateway_config()?;
    let gw = start(cfg, pop3_port, imap_port, tasks).await?;

    let mut pop3 = connect(gw.pop3_port).await?;
    assert_eq!(pop3.expect_line().await?, "+OK mailgate POP3 gateway ready");
    let mut imap = connect(gw.imap_port).await?;
    assert!(imap.expect_line().await?.starts_with("* OK [CAPABILITY IMAP4rev1"));
    wait_for_live(&gw.ctx, 2).await?;

    pop3.send("USER alice").await?;
    pop3.send("PASS anything").await?;
    assert_eq!(pop3.expect_line().await?, "+OK Waiting for password");
    assert_eq!(pop3.expect_line().await?, "+OK Logged in");

    // the IMAP session is unaffected by the POP3 login
    imap.send("a1 NOOP").await?;
    assert_eq!(imap.expect_line().await?, "a1 OK NOOP completed");

    pop3.send("QUIT").await?;
    assert_eq!(pop3.expect_line().await?, "+OK Signing off");
    assert_eq!(pop3.line().await?, None);
    imap.send("a2 LOGOUT").await?;
    assert_eq!(imap.expect_line().await?, "* BYE mailgate IMAP gateway signing off");
    assert_eq!(imap.expect_line().await?, "a2 OK LOGOUT completed");
    wait_for_live(&gw.ctx, 0).await?;
    assert_eq!(gw.ctx.workers().total(), 2);

    gw.control.send(ControlEvent::Terminate).await?;
    let report = gw.dispatcher.await?;
    assert_eq!(report, ShutdownReport { accepted: 2, drain: DrainOutcome::Complete });
    assert!(gw.ctx.is_quitting());

    assert!(TcpStream::connect(("127.0.0.1", gw.pop3_port)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn reset_connection_leaves_other_sessions_alone() -> TestResult {
    let (cfg, pop3_port, imap_port) = gateway_config()?;
    let gw = start(cfg, pop3_port, imap_port, tasks).await?;
    let (live_before, total_before) = (gw.ctx.workers().live(), gw.ctx.workers().total());

    let mut pop3_clients = Vec::new();
    for _ in 0..4 {
        let mut client = connect(gw.pop3_port).await?;
        assert_eq!(client.expect_line().await?, "+OK mailgate POP3 gateway ready");
        pop3_clients.push(client);
    }
    let mut busy = connect(gw.imap_port).await?;
    busy.expect_line().await?;
    wait_for_live(&gw.ctx, live_before + 5).await?;

    let mut victim = pop3_clients.remove(0);
    victim.send("USER alice").await?;
    assert_eq!(victim.expect_line().await?, "+OK Waiting for password");
    victim.send_raw(b"PASS half").await?;

    let busy = tokio::spawn(async move {
        for i in 0..50 {
            busy.send(&format!("b{i} NOOP")).await?;
            assert_eq!(busy.expect_line().await?, format!("b{i} OK NOOP completed"));
        }
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(busy)
    });

    // RST instead of FIN
    let stream = victim.into_inner();
    socket2::SockRef::from(&stream).set_linger(Some(Duration::ZERO))?;
    drop(stream);

    let mut busy = busy.await??;
    wait_for_live(&gw.ctx, live_before + 4).await?;

    for client in &mut pop3_clients {
        client.send("NOOP").await?;
        assert_eq!(client.expect_line().await?, "+OK");
        client.send("QUIT").await?;
        assert_eq!(client.expect_line().await?, "+OK Signing off");
    }
    busy.send("z LOGOUT").await?;
    assert_eq!(busy.expect_line().await?, "* BYE mailgate IMAP gateway signing off");
    assert_eq!(busy.expect_line().await?, "z OK LOGOUT completed");

    wait_for_live(&gw.ctx, live_before).await?;
    assert_eq!(gw.ctx.workers().total(), total_before + 5);

    gw.control.send(ControlEvent::Terminate).await?;
    let report = gw.dispatcher.await?;
    assert_eq!(report, ShutdownReport { accepted: 5, drain: DrainOutcome::Complete });
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_idle_sessions() -> TestResult {
    let (cfg, pop3_port, imap_port) = gateway_config()?;
    let gw = start(cfg, pop3_port, imap_port, tasks).await?;

    let mut pop3 = connect(gw.pop3_port).await?;
    pop3.expect_line().await?;
    let mut imap = connect(gw.imap_port).await?;
    imap.expect_line().await?;
    wait_for_live(&gw.ctx, 2).await?;

    gw.ctx.request_shutdown();
    let report = gw.dispatcher.await?;
    assert_eq!(report.drain, DrainOutcome::Complete);
    assert_eq!(gw.ctx.workers().live(), 0);

    // sessions waiting for input leave without a farewell line
    assert_eq!(pop3.line().await?, None);
    assert_eq!(imap.line().await?, None);
    Ok(())
}

/// Holds every guard forever, like workers that ignore termination
#[derive(Default)]
struct StuckSpawner {
    held: Mutex<Vec<(ServiceKind, WorkerGuard)>>,
}

impl WorkerSpawner for StuckSpawner {
    fn model(&self) -> ProcessModel {
        ProcessModel::Process
    }

    fn spawn(&self, conn: Accepted, guard: WorkerGuard) -> Result<()> {
        if let Ok(mut held) = self.held.lock() {
            held.push((conn.service, guard));
        }
        Ok(())
    }
}

#[tokio::test]
async fn forced_shutdown_reports_remaining_workers() -> TestResult {
    let (mut cfg, pop3_port, imap_port) = gateway_config()?;
    cfg.timeout.drain_polls = 3;
    let stuck = Arc::new(StuckSpawner::default());
    let spawner: Arc<dyn WorkerSpawner> = stuck.clone();
    let gw = start(cfg, pop3_port, imap_port, move |_| spawner).await?;

    let _a = TcpStream::connect(("127.0.0.1", gw.pop3_port)).await?;
    let _b = TcpStream::connect(("127.0.0.1", gw.imap_port)).await?;
    wait_for_live(&gw.ctx, 2).await?;

    gw.control.send(ControlEvent::Terminate).await?;
    let report = gw.dispatcher.await?;
    assert_eq!(report.accepted, 2);
    assert_eq!(report.drain, DrainOutcome::Forced { remaining: 2 });

    let services: Vec<ServiceKind> = stuck.held.lock().map(|h| h.iter().map(|(s, _)| *s).collect()).unwrap_or_default();
    assert!(services.contains(&ServiceKind::Pop3));
    assert!(services.contains(&ServiceKind::Imap));
    Ok(())
}

#[tokio::test]
async fn closed_control_channel_keeps_serving() -> TestResult {
    let (cfg, pop3_port, imap_port) = gateway_config()?;
    let gw = start(cfg, pop3_port, imap_port, tasks).await?;
    drop(gw.control);

    let mut pop3 = connect(gw.pop3_port).await?;
    assert_eq!(pop3.expect_line().await?, "+OK mailgate POP3 gateway ready");
    pop3.send("QUIT").await?;
    assert_eq!(pop3.expect_line().await?, "+OK Signing off");

    gw.ctx.request_shutdown();
    let report = gw.dispatcher.await?;
    assert_eq!(report.accepted, 1);
    Ok(())
}
