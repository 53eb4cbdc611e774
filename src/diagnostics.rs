// Host diagnostics shown on the operator HUD
//
// Network counters for one interface, read through procfs each tick.

use std::collections::HashMap;
use std::path::PathBuf;

use procfs::FromRead;
use procfs::net::{DeviceStatus, InterfaceDeviceStatus};

/// Packet counters for one network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetDevStats {
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

impl NetDevStats {
    /// HUD line shared by every seat
    pub fn hud_line(&self) -> String {
        format!(
            "RxPkt:{} | RxErr:{} | RxDrop: {} | TxPkt:{} | TxErr:{} | TxDrop: {}",
            self.rx_packets,
            self.rx_errors,
            self.rx_dropped,
            self.tx_packets,
            self.tx_errors,
            self.tx_dropped,
        )
    }
}

impl From<&DeviceStatus> for NetDevStats {
    fn from(status: &DeviceStatus) -> Self {
        Self {
            rx_packets: status.recv_packets,
            rx_errors: status.recv_errs,
            rx_dropped: status.recv_drop,
            tx_packets: status.sent_packets,
            tx_errors: status.sent_errs,
            tx_dropped: status.sent_drop,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("failed reading net/dev: {0}")]
    Proc(#[from] procfs::ProcError),

    #[error("interface {0} not found")]
    InterfaceNotFound(String),
}

/// Anything that can produce a fresh counter snapshot
pub trait DiagnosticsSource: Send {
    fn snapshot(&mut self) -> Result<NetDevStats, DiagnosticsError>;
}

/// Always reports zeros
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiagnostics;

impl DiagnosticsSource for NoDiagnostics {
    fn snapshot(&mut self) -> Result<NetDevStats, DiagnosticsError> {
        Ok(NetDevStats::default())
    }
}

/// Reads counters for `interface` from the kernel's net/dev table
#[derive(Debug, Clone)]
pub struct ProcNetDev {
    interface: String,
    // None reads the live /proc/net/dev
    path: Option<PathBuf>,
}

impl ProcNetDev {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            path: None,
        }
    }

    #[cfg(test)]
    fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl DiagnosticsSource for ProcNetDev {
    fn snapshot(&mut self) -> Result<NetDevStats, DiagnosticsError> {
        let table = match &self.path {
            Some(path) => InterfaceDeviceStatus::from_file(path)?.0,
            None => procfs::net::dev_status()?,
        };
        interface_stats(&table, &self.interface)
            .ok_or_else(|| DiagnosticsError::InterfaceNotFound(self.interface.clone()))
    }
}

/// Counters for `interface` out of a parsed net/dev table
pub fn interface_stats(table: &HashMap<String, DeviceStatus>, interface: &str) -> Option<NetDevStats> {
    table.get(interface).map(NetDevStats::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:   48213     512    0    0    0     0          0         0    48213     512    0    0    0     0       0          0
 wlan0: 9876543   12045    3   17    0     0          0        42  1234567    8321    1    2    0     0       0          0
";

    fn table() -> HashMap<String, DeviceStatus> {
        InterfaceDeviceStatus::from_read(SAMPLE.as_bytes()).unwrap().0
    }

    #[test]
    fn test_interface_counters() {
        assert_eq!(
            interface_stats(&table(), "wlan0"),
            Some(NetDevStats {
                rx_packets: 12045,
                rx_errors: 3,
                rx_dropped: 17,
                tx_packets: 8321,
                tx_errors: 1,
                tx_dropped: 2,
            })
        );
    }

    #[test]
    fn test_missing_interface() {
        assert!(interface_stats(&table(), "eth0").is_none());
        assert!(interface_stats(&HashMap::new(), "wlan0").is_none());
    }

    #[test]
    fn test_hud_line_format() {
        let stats = NetDevStats {
            rx_packets: 10,
            rx_errors: 1,
            rx_dropped: 2,
            tx_packets: 20,
            tx_errors: 3,
            tx_dropped: 4,
        };
        assert_eq!(
            stats.hud_line(),
            "RxPkt:10 | RxErr:1 | RxDrop: 2 | TxPkt:20 | TxErr:3 | TxDrop: 4"
        );
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let mut source = ProcNetDev::new("wlan0").with_path("/nonexistent/net/dev");
        assert!(matches!(source.snapshot(), Err(DiagnosticsError::Proc(_))));
    }
}
