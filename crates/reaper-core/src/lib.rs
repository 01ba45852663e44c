//! reaper-core
//!
//! Deferred, lock-free release of foreign-owned handles.
//!
//! 外部ライブラリのハンドルを「見つけたスレッド」では解放せず、
//! ロックなしの行列に積むだけにして、専用の worker スレッドがまとめて解放する。
//! ライブラリのグローバルロックを握っているスレッドからでも `mark` は待たずに返る。
//!
//! # モジュール構成
//! - **atomic**: `AtomicSwap`（swap / 純粋関数による update）
//! - **pending**: 構造共有リスト（O(1) push）
//! - **handle**: `Release` trait と drop で mark する `Reaped`
//! - **reaper**: `Reaper` 本体、worker スレッド、builder
//! - **global**: プロセス全体のインスタンスと `ExitGuard`
//! - **config / clock / observability / error**: 周辺

pub mod atomic;
pub mod clock;
pub mod config;
pub mod error;
pub mod global;
pub mod handle;
pub mod observability;
pub mod pending;
pub mod reaper;

pub use self::atomic::AtomicSwap;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::config::ReaperConfig;
pub use self::error::ReaperError;
pub use self::handle::{Handle, Reaped, Release};
pub use self::observability::{ReaperStats, WorkerFailure};
pub use self::pending::Pending;
pub use self::reaper::{Reaper, ReaperBuilder};
