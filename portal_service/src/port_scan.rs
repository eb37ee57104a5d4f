use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use tokio::{net::TcpStream, sync::Semaphore, sync::mpsc::channel, task, time::timeout};

/// Probe a single loopback port. Every failure mode (refused, timeout,
/// unreachable) counts as closed.
pub async fn probe_port(port: u16, probe_timeout: Duration) -> bool {
    match timeout(probe_timeout, TcpStream::connect((Ipv4Addr::LOCALHOST, port))).await {
        Ok(Ok(_)) => true,
        _ => false,
    }
}

/// Probe an inclusive port range concurrently and collect the open subset,
/// ascending. One task per port, bounded by `max_tasks` permits so a large
/// range cannot exhaust the runtime; the per-probe timeout keeps a silent
/// port from stalling the whole sweep.
pub async fn scan_ports(start: u16, end: u16, probe_timeout: Duration, max_tasks: usize) -> Vec<u16> {
    let permits = Arc::new(Semaphore::new(max_tasks.max(1)));
    let (sender, mut receiver) = channel::<u16>(end.saturating_sub(start) as usize + 1);

    for port in start..=end {
        let permits = permits.clone();
        let sender = sender.clone();
        task::spawn(async move {
            let _permit = permits.acquire_owned().await.unwrap();
            if probe_port(port, probe_timeout).await {
                let _ = sender.send(port).await;
            }
        });
    }
    drop(sender);

    let mut open = Vec::new();
    while let Some(port) = receiver.recv().await {
        open.push(port);
    }
    open.sort_unstable();
    open
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn detects_a_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let open = scan_ports(port, port, Duration::from_millis(100), 64).await;
        assert_eq!(open, vec![port]);
    }

    #[tokio::test]
    async fn closed_port_probes_as_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!probe_port(port, Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn rescan_of_unchanged_listeners_is_idempotent() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut ports = vec![
            first.local_addr().unwrap().port(),
            second.local_addr().unwrap().port(),
        ];
        ports.sort_unstable();
        let (start, end) = (ports[0], ports[1]);

        let one = scan_ports(start, end, Duration::from_millis(100), 512).await;
        let two = scan_ports(start, end, Duration::from_millis(100), 512).await;
        assert_eq!(one, two);
        assert!(one.contains(&ports[0]) && one.contains(&ports[1]));
    }

    #[tokio::test]
    async fn range_sweep_is_bounded_by_fan_out_not_range_size() {
        // 2000 ports at 100ms each would take over three minutes probed one
        // at a time; the concurrent sweep has to finish in a handful of
        // probe-timeout windows.
        let started = Instant::now();
        let _ = scan_ports(42000, 43999, Duration::from_millis(100), 1024).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
