// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::infrastructure::constants::{DEFAULT_PING_COUNT, PROBE_INTERVAL, PROBE_TIMEOUT};
use crate::infrastructure::reachability::icmp::{EchoProbe, IcmpEcho};
use crate::shared::error::{join_errors, FleetError, Result};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Number of lost probes tolerated out of `count`.
///
/// Roughly half the probes may be lost, but never all of them: a single-probe
/// ping fails when that probe is lost. `count == 0` tolerates nothing and
/// sends nothing, so it always succeeds.
pub fn loss_threshold(count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    std::cmp::max(count / 2, count.div_ceil(2)).min(count - 1)
}

/// Result of probing a batch of addresses.
#[derive(Debug, Default)]
pub struct ProbeOutcome {
    /// Addresses that failed their ping, in completion order.
    pub unreachable: Vec<String>,
    /// Joined ping errors, `None` when every address answered.
    pub error: Option<FleetError>,
}

impl ProbeOutcome {
    pub fn is_clean(&self) -> bool {
        self.unreachable.is_empty()
    }
}

#[derive(Clone)]
pub struct Prober {
    echo: Arc<dyn EchoProbe>,
    count: usize,
    interval: Duration,
    probe_timeout: Duration,
}

impl Prober {
    pub fn new(echo: Arc<dyn EchoProbe>, count: usize) -> Self {
        Self {
            echo,
            count,
            interval: PROBE_INTERVAL,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Prober backed by real ICMP datagram sockets.
    pub fn icmp(count: usize) -> Self {
        Self::new(Arc::new(IcmpEcho::new()), count)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Sends `count` echo requests, one per interval, and fails with
    /// `Unreachable` once more than [`loss_threshold`] of them are lost.
    ///
    /// An address that does not parse as an IP is skipped and reported as
    /// reachable.
    pub async fn ping(&self, address: &str, count: usize) -> Result<()> {
        let ip: IpAddr = match address.trim().parse() {
            Ok(ip) => ip,
            Err(e) => {
                warn!(address, error = %e, "skipping reachability check of invalid address");
                return Ok(());
            }
        };

        let tolerated = loss_threshold(count);
        let mut lost = 0usize;
        for seq in 0..count {
            if seq > 0 {
                tokio::time::sleep(self.interval).await;
            }
            if let Err(e) = self.echo.echo(ip, seq as u16, self.probe_timeout).await {
                debug!(address, seq, error = %e, "echo probe lost");
                lost += 1;
                if lost > tolerated {
                    break;
                }
            }
        }

        if lost > tolerated {
            return Err(FleetError::Unreachable {
                address: address.to_string(),
                lost,
                count,
            });
        }
        Ok(())
    }

    /// Pings every address with at most `concurrency` pings in flight.
    ///
    /// A fixed pool of `min(concurrency, len)` workers drains a shared queue.
    /// `concurrency == 0` probes nothing and returns an empty outcome.
    pub async fn probe_all(&self, addresses: &[String], concurrency: usize) -> ProbeOutcome {
        if concurrency == 0 || addresses.is_empty() {
            return ProbeOutcome::default();
        }

        let queue = Arc::new(Mutex::new(addresses.iter().cloned().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, FleetError)>();
        let pool = concurrency.min(addresses.len());

        let mut workers = JoinSet::new();
        for _ in 0..pool {
            let queue = queue.clone();
            let tx = tx.clone();
            let prober = self.clone();
            workers.spawn(async move {
                loop {
                    let Some(address) = queue.lock().await.pop_front() else {
                        break;
                    };
                    if let Err(e) = prober.ping(&address, prober.count).await {
                        // Receiver outlives every worker.
                        let _ = tx.send((address, e));
                    }
                }
            });
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "probe worker panicked");
            }
        }

        let mut unreachable = Vec::new();
        let mut errors = Vec::new();
        while let Some((address, err)) = rx.recv().await {
            unreachable.push(address);
            errors.push(err);
        }

        info!(
            probed = addresses.len(),
            workers = pool,
            unreachable = unreachable.len(),
            "reachability probe finished"
        );

        ProbeOutcome {
            unreachable,
            error: join_errors(errors),
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::icmp(DEFAULT_PING_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::reachability::icmp::MockEchoProbe;
    use std::collections::HashSet;

    fn lost_err() -> FleetError {
        FleetError::Timeout {
            operation: "echo".into(),
            timeout: Duration::from_millis(1),
        }
    }

    fn prober(echo: MockEchoProbe, count: usize) -> Prober {
        Prober::new(Arc::new(echo), count).with_interval(Duration::ZERO)
    }

    /// Echo probe that loses the first `lost` sequence numbers.
    fn losing_first(lost: usize) -> MockEchoProbe {
        let mut echo = MockEchoProbe::new();
        echo.expect_echo().returning(move |_, seq, _| {
            if (seq as usize) < lost {
                Err(lost_err())
            } else {
                Ok(())
            }
        });
        echo
    }

    /// Fails every address whose last octet is odd.
    fn odd_hosts_down() -> MockEchoProbe {
        let mut echo = MockEchoProbe::new();
        echo.expect_echo().returning(|addr, _, _| match addr {
            IpAddr::V4(v4) if v4.octets()[3] % 2 == 1 => Err(lost_err()),
            _ => Ok(()),
        });
        echo
    }

    #[test]
    fn test_loss_threshold() {
        assert_eq!(loss_threshold(0), 0);
        assert_eq!(loss_threshold(1), 0);
        assert_eq!(loss_threshold(2), 1);
        assert_eq!(loss_threshold(3), 2);
        assert_eq!(loss_threshold(4), 2);
        assert_eq!(loss_threshold(5), 3);
        for count in 1..64 {
            assert!(loss_threshold(count) < count);
            assert!(loss_threshold(count) >= count / 2);
        }
    }

    #[tokio::test]
    async fn test_ping_threshold_boundary() {
        for count in 1..=6 {
            let tolerated = loss_threshold(count);

            let ok = prober(losing_first(tolerated), count);
            assert!(ok.ping("10.0.0.1", count).await.is_ok(), "count {count}");

            let bad = prober(losing_first(tolerated + 1), count);
            match bad.ping("10.0.0.1", count).await {
                Err(FleetError::Unreachable { lost, count: c, .. }) => {
                    assert_eq!(lost, tolerated + 1);
                    assert_eq!(c, count);
                }
                other => panic!("count {count}: unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_ping_all_lost_is_unreachable() {
        let p = prober(losing_first(usize::MAX), 3);
        assert!(matches!(
            p.ping("10.0.0.1", 3).await,
            Err(FleetError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_ping_zero_count_sends_nothing() {
        let mut echo = MockEchoProbe::new();
        echo.expect_echo().never();
        assert!(prober(echo, 0).ping("10.0.0.1", 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_ping_invalid_address_is_skipped() {
        let mut echo = MockEchoProbe::new();
        echo.expect_echo().never();
        let p = prober(echo, 3);
        assert!(p.ping("not-an-ip", 3).await.is_ok());
        assert!(p.ping("", 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_all_zero_concurrency() {
        let mut echo = MockEchoProbe::new();
        echo.expect_echo().never();
        let outcome = prober(echo, 3)
            .probe_all(&["10.0.0.1".to_string()], 0)
            .await;
        assert!(outcome.unreachable.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_all_empty_input() {
        let outcome = prober(MockEchoProbe::new(), 3).probe_all(&[], 4).await;
        assert!(outcome.is_clean());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_all_reports_every_failing_address() {
        let addresses: Vec<String> = ["10.0.0.1", "10.0.0.3", "10.0.0.3", "10.0.0.5", "10.0.0.7"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for concurrency in [1, 2, 5, 50] {
            let outcome = prober(losing_first(usize::MAX), 2)
                .probe_all(&addresses, concurrency)
                .await;

            let mut got = outcome.unreachable.clone();
            got.sort();
            let mut want = addresses.clone();
            want.sort();
            assert_eq!(got, want, "concurrency {concurrency}");
            assert!(outcome.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_probe_all_mixed() {
        let addresses: Vec<String> = (1..=6).map(|i| format!("10.0.0.{i}")).collect();
        let outcome = prober(odd_hosts_down(), 3).probe_all(&addresses, 3).await;

        let got: HashSet<_> = outcome.unreachable.iter().cloned().collect();
        let want: HashSet<_> = ["10.0.0.1", "10.0.0.3", "10.0.0.5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(got, want);

        let rendered = outcome.error.unwrap().to_string();
        assert_eq!(rendered.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_probe_all_healthy() {
        let addresses: Vec<String> = vec!["10.0.0.2".into(), "10.0.0.4".into()];
        let outcome = prober(odd_hosts_down(), 3).probe_all(&addresses, 8).await;
        assert!(outcome.is_clean());
        assert!(outcome.error.is_none());
    }
}
