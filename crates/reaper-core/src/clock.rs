//! Clock - 時刻の抽象化
//!
//! Worker の停止記録 ([`WorkerFailure`](crate::WorkerFailure)) に時刻を付けるために使う。
//! テストでは FixedClock に差し替える。

use chrono::{DateTime, Utc};

/// Clock は現在時刻を提供
///
/// # Thread Safety
/// - worker スレッドから呼ばれるので `Send + Sync` を要求
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 本番用: システム時刻
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// テスト用: 常に同じ時刻を返す
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_does_not_move() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(clock.now(), at);
    }

    #[test]
    fn system_clock_moves_forward() {
        let a = SystemClock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = SystemClock.now();
        assert!(b > a);
    }
}
