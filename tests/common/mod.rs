// In-memory stand-in for the oVirt engine.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use cluster_vm_provisioner::core::{
    BootstrapConfig, DeviceAddress, IpVersion, MachineHandle, MachineState, NetworkDevice,
    Platform, PlatformError, PlatformResult, VmInfo,
};

struct FakeVm {
    handle: MachineHandle,
    state: MachineState,
    /// vm_info reads left before a Starting machine reports Up
    boot_reads_left: usize,
    /// vm_info reads left before a locked machine reports Down
    lock_reads_left: Option<usize>,
    device_reads: usize,
    address: String,
}

#[derive(Default)]
struct Inner {
    vms: Vec<FakeVm>,
    next_id: usize,
    rejected: HashSet<String>,
    locked: HashSet<String>,
    locked_for: HashMap<String, usize>,
    never_up: HashSet<String>,
    no_ip: HashSet<String>,
    started: Vec<String>,
    boot_reads: usize,
    ip_after_reads: usize,
}

impl Inner {
    fn add(&mut self, name: &str, state: MachineState) -> MachineHandle {
        self.next_id += 1;
        let handle = MachineHandle::new(format!("vm-{}", self.next_id), name);
        // Locked machines sit in an unknown state, for good or for a few reads
        let lock_reads_left = self.locked_for.get(name).copied();
        let state = if self.locked.contains(name) || lock_reads_left.is_some() {
            MachineState::Unknown
        } else {
            state
        };
        self.vms.push(FakeVm {
            handle: handle.clone(),
            state,
            boot_reads_left: self.boot_reads,
            lock_reads_left,
            device_reads: 0,
            address: format!("10.0.0.{}", self.next_id),
        });
        handle
    }

    fn vm_mut(&mut self, handle: &MachineHandle) -> PlatformResult<&mut FakeVm> {
        self.vms
            .iter_mut()
            .find(|vm| vm.handle.id == handle.id)
            .ok_or_else(|| PlatformError::ApiError {
                method: "GET".into(),
                path: format!("/vms/{}", handle.id),
                status: 404,
                body: "not found".into(),
            })
    }
}

#[derive(Default)]
pub struct FakePlatform {
    inner: Mutex<Inner>,
    create_delay: Duration,
    creates: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicUsize,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Number of Starting reads before a started machine reports Up.
    pub fn with_boot_reads(self, reads: usize) -> Self {
        self.inner.lock().unwrap().boot_reads = reads;
        self
    }

    /// Number of empty device listings before the address shows up.
    pub fn with_ip_after_reads(self, reads: usize) -> Self {
        self.inner.lock().unwrap().ip_after_reads = reads;
        self
    }

    pub fn with_existing(self, name: &str, state: MachineState) -> Self {
        self.inner.lock().unwrap().add(name, state);
        self
    }

    pub fn reject_create(self, name: &str) -> Self {
        self.inner.lock().unwrap().rejected.insert(name.into());
        self
    }

    /// The machine never leaves its post-creation lock, so it never becomes startable.
    pub fn locked(self, name: &str) -> Self {
        self.inner.lock().unwrap().locked.insert(name.into());
        self
    }

    /// The machine reports Unknown for its first `reads` status reads after
    /// creation, then Down. Must come before `with_existing` for that name.
    pub fn locked_for(self, name: &str, reads: usize) -> Self {
        self.inner.lock().unwrap().locked_for.insert(name.into(), reads);
        self
    }

    pub fn never_up(self, name: &str) -> Self {
        self.inner.lock().unwrap().never_up.insert(name.into());
        self
    }

    pub fn without_ip(self, name: &str) -> Self {
        self.inner.lock().unwrap().no_ip.insert(name.into());
        self
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.inner.lock().unwrap().started.clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn find_by_name(&self, name: &str) -> PlatformResult<Vec<MachineHandle>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .vms
            .iter()
            .filter(|vm| vm.handle.name == name)
            .map(|vm| vm.handle.clone())
            .collect())
    }

    async fn create_vm(
        &self,
        name: &str,
        _cluster: &str,
        _template: &str,
    ) -> PlatformResult<MachineHandle> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        // Rejections come back before any work is done
        if self.inner.lock().unwrap().rejected.contains(name) {
            return Err(PlatformError::ApiError {
                method: "POST".into(),
                path: "/vms".into(),
                status: 400,
                body: "Cannot add VM. The template does not exist.".into(),
            });
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.create_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(self.inner.lock().unwrap().add(name, MachineState::Down))
    }

    async fn start_vm(
        &self,
        vm: &MachineHandle,
        bootstrap: &BootstrapConfig,
    ) -> PlatformResult<()> {
        assert!(!bootstrap.authorized_ssh_keys.is_empty());
        let mut inner = self.inner.lock().unwrap();
        inner.started.push(vm.name.clone());
        let fake = inner.vm_mut(vm)?;
        assert_eq!(fake.state, MachineState::Down, "{} started twice", vm.name);
        fake.state = MachineState::Starting;
        Ok(())
    }

    async fn vm_info(&self, vm: &MachineHandle) -> PlatformResult<VmInfo> {
        let mut inner = self.inner.lock().unwrap();
        let stuck = inner.never_up.contains(&vm.name);
        let fake = inner.vm_mut(vm)?;
        if let Some(left) = fake.lock_reads_left {
            if left == 0 {
                fake.lock_reads_left = None;
                fake.state = MachineState::Down;
            } else {
                fake.lock_reads_left = Some(left - 1);
            }
        }
        if fake.state == MachineState::Starting && !stuck {
            if fake.boot_reads_left == 0 {
                fake.state = MachineState::Up;
            } else {
                fake.boot_reads_left -= 1;
            }
        }
        Ok(VmInfo {
            handle: fake.handle.clone(),
            state: fake.state,
            fqdn: None,
        })
    }

    async fn reported_devices(&self, vm: &MachineHandle) -> PlatformResult<Vec<NetworkDevice>> {
        let mut inner = self.inner.lock().unwrap();
        let silent = inner.no_ip.contains(&vm.name);
        let ip_after = inner.ip_after_reads;
        let fake = inner.vm_mut(vm)?;
        fake.device_reads += 1;
        if silent || fake.state != MachineState::Up || fake.device_reads <= ip_after {
            return Ok(Vec::new());
        }
        Ok(vec![
            NetworkDevice {
                name: "lo".into(),
                addresses: vec![DeviceAddress {
                    address: "127.0.0.1".into(),
                    version: IpVersion::V4,
                }],
            },
            NetworkDevice {
                name: "eth0".into(),
                addresses: vec![
                    DeviceAddress {
                        address: "fe80::1".into(),
                        version: IpVersion::V6,
                    },
                    DeviceAddress {
                        address: fake.address.clone(),
                        version: IpVersion::V4,
                    },
                ],
            },
        ])
    }

    async fn list_vms(&self) -> PlatformResult<Vec<MachineHandle>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.vms.iter().map(|vm| vm.handle.clone()).collect())
    }

    async fn close(&self) -> PlatformResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
