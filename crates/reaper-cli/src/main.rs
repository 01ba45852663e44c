use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use reaper_core::{Reaped, ReaperConfig, ReaperError, ReaperStats, Release, global};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep, timeout};
use tracing::info;
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

/// 外部ライブラリの代役: 生きているオブジェクトの集合を API ロックの中に持つ
#[derive(Debug, Default)]
struct Session {
    live: HashSet<Ulid>,
}

/// A pointer into the fake library. Releasing it needs the API lock.
struct TrackPtr {
    id: Ulid,
    api: Arc<Mutex<Session>>,
    fail: bool,
}

impl std::fmt::Debug for TrackPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackPtr({})", self.id)
    }
}

impl Release for TrackPtr {
    fn release(&self) -> Result<(), ReaperError> {
        // worker スレッドは runtime の外なので blocking_lock してよい
        let mut session = self.api.blocking_lock();
        if self.fail {
            return Err(ReaperError::release(format!(
                "sp_track_release({}) refused",
                self.id
            )));
        }
        session.live.remove(&self.id);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Report {
    handles: usize,
    failed_on_purpose: usize,
    still_live: usize,
    stats: ReaperStats,
}

fn load_config() -> Result<ReaperConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(ReaperConfig::default().with_idle_interval(Duration::from_millis(100))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) reaper を設定して起動。main を抜けるときに exit guard が止める
    let _exit = global::exit_guard();
    let config = load_config()?;
    info!(?config, "starting reaper");
    global::init(config)?;

    // (B) ライブラリ側のオブジェクトを作る（一部はわざと解放に失敗させる）
    let api = Arc::new(Mutex::new(Session::default()));
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(8..16);
    let mut handles = Vec::with_capacity(count);
    let mut failed_on_purpose = 0;
    for _ in 0..count {
        let id = Ulid::new();
        let fail = rng.gen_bool(0.2);
        failed_on_purpose += usize::from(fail);
        api.lock().await.live.insert(id);
        handles.push(Reaped::global(TrackPtr {
            id,
            api: Arc::clone(&api),
            fail,
        }));
    }

    // (C) API ロックを握ったまま finalizer を走らせる。
    //     mark はロックを待たないので、ここでデッドロックしない
    let held = api.lock().await;
    let finalizers: Vec<_> = handles
        .into_iter()
        .map(|handle| tokio::task::spawn_blocking(move || drop(handle)))
        .collect();
    for f in finalizers {
        timeout(Duration::from_secs(1), f).await??;
    }
    info!(
        pending = global::instance().pending(),
        "finalizers returned while the api lock was held"
    );
    drop(held);

    // (D) worker が全部処理するまで待つ
    let reaper = global::instance();
    loop {
        let stats = reaper.stats();
        if (stats.released + stats.failed) as usize >= count {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    let report = Report {
        handles: count,
        failed_on_purpose,
        still_live: api.lock().await.live.len(),
        stats: reaper.stats(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
