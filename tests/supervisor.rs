//! Worker pool supervision with real child processes.

#![cfg(unix)]

use std::collections::HashSet;
use std::io::{self, Write};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::timeout;

use serde_json::{json, Value};

use prompt_gateway::config::SupervisorConfig;
use prompt_gateway::lifecycle::Shutdown;
use prompt_gateway::supervisor::{PoolStatus, Supervisor, SupervisorError};

mod common;
use common::{start_fixed_upstream, MockUpstream};

fn long_running(_slot: usize) -> io::Result<Child> {
    Command::new("sleep").arg("30").kill_on_drop(true).spawn()
}

fn config() -> SupervisorConfig {
    SupervisorConfig {
        restart_base_delay_ms: 10,
        restart_max_delay_ms: 50,
        max_restarts: 3,
        shutdown_grace_secs: 2,
        ..SupervisorConfig::default()
    }
}

async fn wait_for<F>(rx: &mut watch::Receiver<PoolStatus>, f: F) -> PoolStatus
where
    F: FnMut(&PoolStatus) -> bool,
{
    timeout(Duration::from_secs(10), rx.wait_for(f))
        .await
        .expect("pool status did not converge")
        .expect("supervisor dropped its status channel")
        .clone()
}

#[tokio::test]
async fn dead_worker_is_replaced() {
    let supervisor = Supervisor::new(long_running, 3, &config());
    let mut status = supervisor.status();
    let shutdown = Shutdown::new();
    let run = tokio::spawn(supervisor.run(shutdown.clone()));

    let full = wait_for(&mut status, |s| s.live == 3).await;
    let victim = full.pids[1].unwrap();
    kill(Pid::from_raw(victim as i32), Signal::SIGKILL).unwrap();

    let healed = wait_for(&mut status, |s| s.live == 3 && s.restarts == 1).await;
    assert_ne!(healed.pids[1], Some(victim));
    assert_eq!(healed.pids[0], full.pids[0]);
    assert_eq!(healed.abandoned, 0);

    shutdown.trigger();
    let result = timeout(Duration::from_secs(10), run).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(status.borrow().live, 0);
}

#[tokio::test]
async fn crash_loop_abandons_every_slot() {
    let crashing = |_slot: usize| Command::new("sh").args(["-c", "exit 1"]).spawn();
    let supervisor = Supervisor::new(crashing, 2, &config());
    let status = supervisor.status();

    let result = timeout(Duration::from_secs(10), supervisor.run(Shutdown::new()))
        .await
        .expect("supervisor should give up");
    assert!(matches!(result, Err(SupervisorError::AllWorkersFailed(2))));

    let last = status.borrow().clone();
    assert_eq!(last.abandoned, 2);
    assert_eq!(last.live, 0);
    // Each slot: first start plus `max_restarts` replacements.
    assert_eq!(last.restarts, 6);
}

#[tokio::test]
async fn startup_spawn_failure_is_reported() {
    let broken = |_slot: usize| Command::new("/nonexistent/prompt-gateway").spawn();
    let supervisor = Supervisor::new(broken, 2, &config());

    let result = supervisor.run(Shutdown::new()).await;
    assert!(matches!(result, Err(SupervisorError::Spawn { slot: 0, .. })));
}

#[tokio::test]
async fn stubborn_worker_is_killed_after_grace() {
    let stubborn = |_slot: usize| {
        Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .kill_on_drop(true)
            .spawn()
    };
    let mut config = config();
    config.shutdown_grace_secs = 1;
    let supervisor = Supervisor::new(stubborn, 1, &config);
    let mut status = supervisor.status();
    let shutdown = Shutdown::new();
    let run = tokio::spawn(supervisor.run(shutdown.clone()));

    wait_for(&mut status, |s| s.live == 1).await;
    // Give the shell time to install its trap before signalling.
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.trigger();

    let result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(status.borrow().live, 0);
}

const CLUSTER_CONFIG: &str = r#"
[listener]
host = "127.0.0.1"

[rate_limit]
enabled = false

[supervisor]
restart_base_delay_ms = 10
restart_max_delay_ms = 50
shutdown_grace_secs = 2

[observability]
log_level = "warn"
"#;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn start_cluster(upstream: &MockUpstream, config: &std::path::Path, port: u16) -> Child {
    Command::new(env!("CARGO_BIN_EXE_prompt-gateway"))
        .arg("--config")
        .arg(config)
        .args(["--port", &port.to_string(), "cluster", "--workers", "2"])
        .env_remove("GATEWAY_CONFIG")
        .env_remove("PORT")
        .env("UPSTREAM_BASE_URL", upstream.base_url())
        .env("RAPIDAPI_KEY", "test-key")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None::<Signal>).is_ok()
}

/// Worker pids answering `/health`. Every request opens a fresh connection so
/// the kernel spreads them across the reuse-port group.
async fn live_pids(client: &reqwest::Client, port: u16, rounds: usize) -> HashSet<u32> {
    let mut pids = HashSet::new();
    for _ in 0..rounds {
        let url = format!("http://127.0.0.1:{port}/health");
        let Ok(response) = client.get(url).send().await else {
            continue;
        };
        if let Ok(body) = response.json::<Value>().await {
            if let Some(pid) = body["pid"].as_u64() {
                pids.insert(pid as u32);
            }
        }
    }
    pids
}

async fn wait_for_pids<F>(client: &reqwest::Client, port: u16, mut done: F) -> HashSet<u32>
where
    F: FnMut(&HashSet<u32>) -> bool,
{
    timeout(Duration::from_secs(20), async {
        loop {
            let pids = live_pids(client, port, 40).await;
            if done(&pids) {
                return pids;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("cluster did not reach the expected workers")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cluster_heals_while_serving() {
    let upstream = start_fixed_upstream(json!({"result": "pong", "status": true})).await;
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    config_file.write_all(CLUSTER_CONFIG.as_bytes()).unwrap();
    let port = free_port();
    let mut cluster = start_cluster(&upstream, config_file.path(), port);

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let before = wait_for_pids(&client, port, |pids| pids.len() == 2).await;
    let victim = *before.iter().next().unwrap();
    kill(Pid::from_raw(victim as i32), Signal::SIGKILL).unwrap();

    let mut ok = 0;
    let mut failed = 0;
    for i in 0..40 {
        let sent = client
            .post(format!("http://127.0.0.1:{port}/generate"))
            .json(&json!({"prompt": format!("during restart {i}")}))
            .send()
            .await;
        match sent {
            Ok(response) => {
                assert_eq!(response.status(), reqwest::StatusCode::OK, "request {i}");
                let body: Value = response.json().await.unwrap();
                assert_eq!(body, json!({"status": true, "result": "pong"}));
                ok += 1;
            }
            // Connections routed to the dying worker may be reset.
            Err(_) => failed += 1,
        }
    }
    assert!(ok >= 35, "only {ok} of 40 requests succeeded ({failed} failed)");

    let after = wait_for_pids(&client, port, |pids| {
        pids.len() == 2 && !pids.contains(&victim)
    })
    .await;
    assert!(after.iter().all(|pid| is_alive(*pid)));

    let supervisor = cluster.id().unwrap();
    kill(Pid::from_raw(supervisor as i32), Signal::SIGTERM).unwrap();
    let status = timeout(Duration::from_secs(10), cluster.wait())
        .await
        .expect("cluster did not stop after SIGTERM")
        .unwrap();
    assert!(status.success(), "{status}");
    for pid in after {
        assert!(!is_alive(pid), "worker {pid} outlived the supervisor");
    }
}
