use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Disks, System};

/// Read-only view of host resources.
pub trait HostProbe: Send + Sync {
    /// Free bytes on the filesystem that holds (or would hold) `path`.
    fn available_disk_bytes(&self, path: &Path) -> Option<u64>;

    fn available_memory_bytes(&self) -> Option<u64>;

    fn cpu_count(&self) -> Option<usize>;

    /// Whether something already listens on `port`.
    fn port_in_use(&self, port: u16) -> bool;

    fn find_binary(&self, name: &str) -> Option<PathBuf>;
}

/// Probe backed by `sysinfo`, the socket API and `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn available_disk_bytes(&self, path: &Path) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count())
            .map(|disk| disk.available_space())
    }

    fn available_memory_bytes(&self) -> Option<u64> {
        let mut sys = System::new();
        sys.refresh_memory();
        let available = sys.available_memory();
        (available > 0).then_some(available)
    }

    fn cpu_count(&self) -> Option<usize> {
        let mut sys = System::new();
        sys.refresh_cpu();
        let count = sys.cpus().len();
        (count > 0).then_some(count)
    }

    fn port_in_use(&self, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        match TcpListener::bind(addr) {
            Ok(_) => false,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => true,
            // Unprivileged users cannot bind low ports; see if anything answers.
            Err(_) => TcpStream::connect_timeout(
                &SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
                Duration::from_millis(500),
            )
            .is_ok(),
        }
    }

    fn find_binary(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}
