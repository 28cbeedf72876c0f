// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A simulated SoC for unit tests.
//!
//! [`SimSoc`] is a sparse register file with just enough behavior behind
//! it to exercise bring-up: a virtual clock advanced by `stall`, scripted
//! link training per LTSSM enable, a device model behind each config
//! window, scripted retrain results, the PHY handshake and banked iATU
//! viewports.

use crate::dt::DtNode;
use crate::dt::DeviceTreeSnapshot;
use crate::hal::PlatformHal;
use crate::soc::IatuLayout;
use crate::soc::SocVariant;
use crate::topology::Topology;
use baikal_pcie_defs::bm1000::phy;
use baikal_pcie_defs::bm1000::phy::PhyAddress;
use baikal_pcie_defs::bm1000::phy::PhyStatus;
use baikal_pcie_defs::bs1000;
use baikal_pcie_defs::caps::pci_express::LinkCapabilities;
use baikal_pcie_defs::caps::pci_express::LinkControl;
use baikal_pcie_defs::caps::pci_express::LinkControl2;
use baikal_pcie_defs::caps::pci_express::LinkStatus;
use baikal_pcie_defs::cfg_space;
use baikal_pcie_defs::dw::iatu;
use baikal_pcie_defs::dw::iatu::RegionControl1;
use baikal_pcie_defs::dw::iatu::RegionControl2;
use baikal_pcie_defs::dw::ltssm::LinkDebugStatus;
use baikal_pcie_defs::dw::ltssm::LtssmState;
use baikal_pcie_defs::dw::port_logic;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;

/// Installs a test-writer subscriber, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// How a port trains after one LTSSM enable.
#[derive(Debug, Copy, Clone)]
pub enum Training {
    /// Detect never finds a receiver.
    NoPartner,
    /// Polling until `after`, then L0.
    LinkUp {
        after: Duration,
        speed: u8,
        width: u8,
    },
    /// Polling forever.
    StuckPolling,
    /// Polling until `after`, then Polling.Compliance forever.
    Compliance { after: Duration },
}

/// How a port answers one retrain request.
#[derive(Debug, Copy, Clone)]
pub enum RetrainResult {
    /// Back in L0 at the lower of the target and the device's speed.
    Reach,
    /// Back in L0 at this speed.
    Capped(u8),
    /// The link drops.
    Lose,
    /// Stuck in Recovery.
    Hang,
}

/// Time a simulated retrain spends in Recovery.
pub const RETRAIN_LATENCY: Duration = Duration::from_millis(3);

/// A function at device 0 of the bus below a port.
#[derive(Debug, Clone)]
pub struct SimDevice {
    id: u32,
    max_speed: u8,
    pcie_cap: Option<u16>,
    looping_caps: bool,
    aliases_functions: bool,
    not_ready_reads: u32,
}

impl SimDevice {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            max_speed: 3,
            pcie_cap: Some(0x40),
            looping_caps: false,
            aliases_functions: false,
            not_ready_reads: 0,
        }
    }

    pub fn max_speed(mut self, speed: u8) -> Self {
        self.max_speed = speed;
        self
    }

    /// Places the PCIe capability at `offset`, behind a power management
    /// capability at 0x40 when `offset` is not 0x40.
    pub fn pcie_cap_at(mut self, offset: u16) -> Self {
        self.pcie_cap = Some(offset);
        self
    }

    pub fn without_pcie_cap(mut self) -> Self {
        self.pcie_cap = None;
        self
    }

    /// A capability list whose first entry points at itself.
    pub fn looping_caps(mut self) -> Self {
        self.looping_caps = true;
        self
    }

    /// Device 1 decodes to device 0.
    pub fn aliases_functions(mut self) -> Self {
        self.aliases_functions = true;
        self
    }

    /// The first `count` reads of the ID register return all ones.
    pub fn not_ready_reads(mut self, count: u32) -> Self {
        self.not_ready_reads = count;
        self
    }

    fn read(&self, offset: u64) -> u32 {
        const PM_CAP_ID: u32 = 0x01;
        let cap = |id: u32, next: u16| id | (next as u32) << 8;
        match offset {
            0x00 => self.id,
            0x08 => (0x01_08_02 << 8) | 0x01,
            0x34 => cfg_space::FIRST_CAPABILITY_OFFSET as u32,
            0x40 if self.looping_caps => cap(PM_CAP_ID, 0x40),
            _ => match self.pcie_cap {
                None if offset == 0x40 => cap(PM_CAP_ID, 0),
                Some(0x40) if offset == 0x40 => cap(0x10, 0),
                Some(pos) if offset == 0x40 => cap(PM_CAP_ID, pos),
                Some(pos) if offset == pos as u64 => cap(0x10, 0),
                Some(pos) if offset == pos as u64 + 0x0C => LinkCapabilities::new()
                    .with_max_link_speed(self.max_speed.into())
                    .with_max_link_width(16)
                    .into_bits(),
                _ => 0,
            },
        }
    }
}

struct Retrain {
    started: Duration,
    result: RetrainResult,
    target: u8,
}

struct SimPort {
    variant: &'static SocVariant,
    index: u32,
    dbi: u64,
    control: u64,
    config: u64,
    config_size: u64,
    training: Vec<Training>,
    ltssm_enables: u32,
    enabled_at: Option<Duration>,
    speed_override: Option<u8>,
    lost: bool,
    retrain: Option<Retrain>,
    retrain_script: VecDeque<RetrainResult>,
    retrain_requests: u32,
    device: Option<SimDevice>,
    reset_done_stuck: bool,
}

#[derive(Default)]
struct SimPhy {
    registers: HashMap<u32, u32>,
    status: u32,
    pending_write: Option<u32>,
    stuck: bool,
}

#[derive(Copy, Clone)]
struct LinkView {
    ltssm: LtssmState,
    up: bool,
    training: bool,
    speed: u8,
    width: u8,
}

#[derive(Default)]
struct SimState {
    now: Duration,
    registers: HashMap<u64, u32>,
    writes: Vec<(u64, u32)>,
    ports: Vec<SimPort>,
    viewports: HashMap<u64, u32>,
    iatu_banks: HashMap<(u64, u32, u16), u32>,
    phys: HashMap<u64, SimPhy>,
}

/// Simulated SoC, see the module docs.
#[derive(Default)]
pub struct SimSoc {
    state: Mutex<SimState>,
}

/// Register state of one outbound iATU region.
#[derive(Debug)]
pub struct SimIatuRegion {
    control_1: u32,
    control_2: u32,
    lower_base: u32,
    upper_base: u32,
    limit: u32,
    upper_limit: u32,
    lower_target: u32,
    upper_target: u32,
}

impl SimIatuRegion {
    pub fn enabled(&self) -> bool {
        RegionControl2::from_bits(self.control_2).region_enable()
    }

    pub fn shift_mode(&self) -> bool {
        RegionControl2::from_bits(self.control_2).cfg_shift_mode()
    }

    pub fn region_type(&self) -> u32 {
        RegionControl1::from_bits(self.control_1).region_type()
    }

    pub fn cpu_base(&self) -> u64 {
        (self.upper_base as u64) << 32 | self.lower_base as u64
    }

    pub fn cpu_limit(&self) -> u64 {
        (self.upper_limit as u64) << 32 | self.limit as u64
    }

    pub fn target(&self) -> u64 {
        (self.upper_target as u64) << 32 | self.lower_target as u64
    }
}

/// Builds a topology from `dt_nodes`.
pub fn topology(
    variant: &'static SocVariant,
    dt_nodes: impl IntoIterator<Item = DtNode>,
) -> Topology {
    let tree = dt_nodes
        .into_iter()
        .fold(DeviceTreeSnapshot::new(), DeviceTreeSnapshot::with_node);
    Topology::load(&tree, variant)
}

/// Config window size used by the node builders: 32 buses.
pub const CONFIG_SIZE: u64 = 0x200_0000;

fn hi(value: u64) -> u32 {
    (value >> 32) as u32
}

fn lo(value: u64) -> u32 {
    value as u32
}

/// One `ranges` entry. `space` is the code in phys.hi bits 25:24.
pub fn range(space: u32, pci: u64, cpu: u64, size: u64) -> [u32; 7] {
    let code = space << 24;
    [code, hi(pci), lo(pci), hi(cpu), lo(cpu), hi(size), lo(size)]
}

/// `reg` cells for `(base, size)` regions.
pub fn reg(regions: &[(u64, u64)]) -> Vec<u32> {
    regions
        .iter()
        .flat_map(|&(base, size)| [hi(base), lo(base), hi(size), lo(size)])
        .collect()
}

/// Standard `ranges` with I/O, 32-bit and 64-bit memory windows placed in
/// the CPU slot at `slot`.
fn ranges(slot: u64, mem64_cpu: u64) -> Vec<u32> {
    let mut cells = Vec::new();
    cells.extend(range(1, 0, slot + 0x0200_0000, 0x1_0000));
    cells.extend(range(2, 0x4000_0000, slot + 0x0400_0000, 0x0400_0000));
    cells.extend(range(3, mem64_cpu, mem64_cpu, 0x8000_0000));
    cells
}

/// DBI base of BM1000 controller `index` in test trees.
pub fn bm1000_dbi(index: u32) -> u64 {
    0x0220_0000 + index as u64 * 0x10_0000
}

/// A BM1000 x4 controller node with every optional property set.
pub fn bm1000_node(index: u32) -> DtNode {
    let dbi = bm1000_dbi(index);
    let slot = 0x40_0000_0000 + index as u64 * 0x1000_0000;
    DtNode::new(format!("pcie@{:x}", dbi))
        .with_strings("compatible", &["baikal,bm1000-pcie", "snps,dw-pcie"])
        .with_cells("reg", &reg(&[(dbi, 0x1000), (slot, CONFIG_SIZE)]))
        .with_strings("reg-names", &["dbi", "config"])
        .with_cells("baikal,pcie-lcru", &[0x20, index])
        .with_cells("num-lanes", &[4])
        .with_cells("max-link-speed", &[3])
        .with_cells("msi-map", &[0, 0x30, index << 16, 0x1_0000])
        .with_cells(
            "ranges",
            &ranges(slot, 0x48_0000_0000 + index as u64 * 0x1_0000_0000),
        )
        .with_string("status", "okay")
}

/// APB base of BS1000 controller `index` in test trees.
pub fn bs1000_apb(index: u32) -> u64 {
    0x3800_0000 + index as u64 * 0x1_0000
}

/// A BS1000 x16 controller node. Controllers 8 and up use CPU addresses
/// with bit 39 set to exercise address masking.
pub fn bs1000_node(index: u32) -> DtNode {
    let dbi = bs1000::DBI_BASES[index as usize];
    let apb = bs1000_apb(index);
    let high = if index >= bs1000::WIDE_ADDRESS_CONTROLLERS {
        0x80_0000_0000
    } else {
        0
    };
    let slot = high + 0x10_0000_0000 + index as u64 * 0x1000_0000;
    let regions = reg(&[(dbi, 0x10_0000), (apb, 0x1000), (slot, CONFIG_SIZE)]);
    DtNode::new(format!("pcie@{:x}", dbi))
        .with_string("compatible", "baikal,bs1000-pcie")
        .with_cells("reg", &regions)
        .with_cells("num-lanes", &[16])
        .with_cells("reset-gpios", &[0x31, index, 1])
        .with_cells(
            "ranges",
            &ranges(slot, high + 0x20_0000_0000 + index as u64 * 0x1_0000_0000),
        )
}

impl SimPort {
    fn link(&self, now: Duration) -> LinkView {
        let down = |ltssm| LinkView {
            ltssm,
            up: false,
            training: false,
            speed: 1,
            width: 0,
        };
        let Some(enabled_at) = self.enabled_at else {
            return down(LtssmState::DETECT_QUIET);
        };
        if self.lost {
            return down(LtssmState::DETECT_QUIET);
        }
        let elapsed = now - enabled_at;
        let attempt = self.ltssm_enables.saturating_sub(1) as usize;
        let script = self
            .training
            .get(attempt)
            .or(self.training.last())
            .copied()
            .unwrap_or(Training::NoPartner);
        match script {
            Training::NoPartner => down(if elapsed.as_millis().is_multiple_of(2) {
                LtssmState::DETECT_QUIET
            } else {
                LtssmState::DETECT_ACT
            }),
            Training::StuckPolling => down(LtssmState::POLL_ACTIVE),
            Training::Compliance { after } => down(if elapsed < after {
                LtssmState::POLL_ACTIVE
            } else {
                LtssmState::POLL_COMPLIANCE
            }),
            Training::LinkUp { after, .. } if elapsed < after => down(LtssmState::POLL_ACTIVE),
            Training::LinkUp { speed, width, .. } => {
                let speed = self.speed_override.unwrap_or(speed);
                match &self.retrain {
                    Some(retrain)
                        if matches!(retrain.result, RetrainResult::Hang)
                            || now - retrain.started < RETRAIN_LATENCY =>
                    {
                        LinkView {
                            ltssm: LtssmState::RCVRY_LOCK,
                            up: true,
                            training: true,
                            speed,
                            width,
                        }
                    }
                    _ => LinkView {
                        ltssm: LtssmState::L0,
                        up: true,
                        training: false,
                        speed,
                        width,
                    },
                }
            }
        }
    }

    /// Resolves a retrain whose recovery time has passed.
    fn settle(&mut self, now: Duration) {
        let Some(retrain) = &self.retrain else {
            return;
        };
        if now - retrain.started < RETRAIN_LATENCY {
            return;
        }
        let device_speed = self.device.as_ref().map_or(5, |d| d.max_speed);
        match retrain.result {
            RetrainResult::Hang => return,
            RetrainResult::Reach => {
                self.speed_override = Some(retrain.target.min(device_speed));
            }
            RetrainResult::Capped(speed) => self.speed_override = Some(speed),
            RetrainResult::Lose => self.lost = true,
        }
        self.retrain = None;
    }

    fn config_read(&mut self, offset: u64, now: Duration) -> u32 {
        if !self.link(now).up {
            return cfg_space::INVALID_READ;
        }
        let Some(device) = &mut self.device else {
            return cfg_space::INVALID_READ;
        };
        let device_1 = cfg_space::ecam_offset(0, 1, 0, 0);
        let offset = match offset {
            0..0x1000 => offset,
            o if device.aliases_functions && (device_1..device_1 + 0x1000).contains(&o) => {
                o - device_1
            }
            _ => return cfg_space::INVALID_READ,
        };
        if offset == 0 && device.not_ready_reads > 0 {
            device.not_ready_reads -= 1;
            return cfg_space::INVALID_READ;
        }
        device.read(offset)
    }
}

impl SimState {
    fn port(&self, index: u32) -> &SimPort {
        self.ports
            .iter()
            .find(|p| p.index == index)
            .expect("no such simulated port")
    }

    fn port_mut(&mut self, index: u32) -> &mut SimPort {
        self.ports
            .iter_mut()
            .find(|p| p.index == index)
            .expect("no such simulated port")
    }

    fn viewport_register(&self, address: u64) -> Option<(u64, u16)> {
        self.viewports.keys().find_map(|&dbi| {
            let offset = address.checked_sub(dbi)?;
            let first = iatu::VIEWPORT_REGISTERS.control_1 as u64;
            let last = iatu::VIEWPORT_REGISTERS.upper_limit as u64;
            (first..=last)
                .contains(&offset)
                .then_some((dbi, offset as u16))
        })
    }

    fn phy_register(&self, address: u64) -> Option<(u64, u16)> {
        self.phys.keys().find_map(|&dbi| {
            let offset = address.checked_sub(dbi)?;
            (phy::LANES as u64..=phy::STATUS as u64)
                .contains(&offset)
                .then_some((dbi, offset as u16))
        })
    }

    fn read(&mut self, address: u64) -> u32 {
        let now = self.now;
        if let Some((dbi, offset)) = self.viewport_register(address) {
            let region = self.viewports[&dbi];
            return self
                .iatu_banks
                .get(&(dbi, region, offset))
                .copied()
                .unwrap_or(0);
        }
        if let Some((dbi, offset)) = self.phy_register(address) {
            let model = &self.phys[&dbi];
            match offset {
                phy::DATA => {
                    return self.registers.get(&address).copied().unwrap_or(0);
                }
                phy::STATUS => {
                    return if model.stuck {
                        PhyStatus::new().with_busy(true).into_bits()
                    } else {
                        model.status
                    };
                }
                _ => {}
            }
        }
        let registers = &self.registers;
        for port in &mut self.ports {
            port.settle(now);
            let control = &port.variant.control;
            if address == port.control + control.link_status as u64 {
                let link = port.link(now);
                return LinkDebugStatus::new()
                    .with_ltssm(link.ltssm.0)
                    .with_smlh_link_up(link.up)
                    .with_rdlh_link_up(link.up)
                    .into_bits();
            }
            if let Some(poll) = &control.reset_done {
                if address == port.control + poll.register as u64 {
                    return if port.reset_done_stuck { 0 } else { poll.done };
                }
            }
            if address == port.dbi + port_logic::LINK_CTL_STS as u64 {
                let link = port.link(now);
                let control = registers.get(&address).copied().unwrap_or(0) as u16;
                let status = LinkStatus::new()
                    .with_current_link_speed(link.speed.into())
                    .with_negotiated_link_width(link.width.into())
                    .with_data_link_layer_link_active(link.up)
                    .with_link_training(link.training);
                return (status.into_bits() as u32) << 16 | control as u32;
            }
            if (port.config..port.config + port.config_size).contains(&address) {
                return port.config_read(address - port.config, now);
            }
        }
        registers.get(&address).copied().unwrap_or(0)
    }

    fn write(&mut self, address: u64, value: u32) {
        let now = self.now;
        self.writes.push((address, value));

        let selected = address.wrapping_sub(iatu::VIEWPORT as u64);
        if let Some(region) = self.viewports.get_mut(&selected) {
            *region = value;
        }
        if let Some((dbi, offset)) = self.viewport_register(address) {
            let region = self.viewports[&dbi];
            self.iatu_banks.insert((dbi, region, offset), value);
            return;
        }

        if let Some((dbi, offset)) = self.phy_register(address) {
            let model = self.phys.get_mut(&dbi).unwrap();
            match offset {
                phy::ADDRESS if !model.stuck => {
                    let request = PhyAddress::from_bits(value);
                    if request.write() {
                        model.pending_write = Some(request.address());
                    } else {
                        let data = model.registers.get(&request.address()).copied().unwrap_or(0);
                        self.registers.insert(dbi + phy::DATA as u64, data);
                    }
                    model.status = PhyStatus::new().with_done(true).into_bits();
                }
                phy::DATA => {
                    if let Some(pending) = model.pending_write.take() {
                        model.registers.insert(pending, value);
                    }
                }
                _ => {}
            }
        }

        let previous = self.registers.get(&address).copied().unwrap_or(0);
        let mut stored = value;
        for port in &mut self.ports {
            port.settle(now);
            let control = &port.variant.control;
            if address == port.control + control.ltssm_control as u64 {
                let was = previous & control.ltssm_enable != 0;
                let is = value & control.ltssm_enable != 0;
                if is && !was {
                    port.ltssm_enables += 1;
                    port.enabled_at = Some(now);
                    port.speed_override = None;
                    port.lost = false;
                    port.retrain = None;
                } else if was && !is {
                    port.enabled_at = None;
                }
            }
            if address == port.dbi + port_logic::LINK_CTL_STS as u64 {
                let control = LinkControl::from_bits(value as u16);
                if control.retrain_link() {
                    port.retrain_requests += 1;
                    let ctl2 = port.dbi + port_logic::LINK_CTL_STS_2 as u64;
                    let ctl2 = self.registers.get(&ctl2).copied().unwrap_or(0);
                    let target = LinkControl2::from_bits(ctl2 as u16).target_link_speed() as u8;
                    if port.link(now).up {
                        port.retrain = Some(Retrain {
                            started: now,
                            result: port.retrain_script.pop_front().unwrap_or(RetrainResult::Reach),
                            target,
                        });
                    }
                }
                stored = control.with_retrain_link(false).into_bits() as u32;
            }
            if (port.config..port.config + port.config_size).contains(&address) {
                return;
            }
        }
        self.registers.insert(address, stored);
    }
}

impl PlatformHal for SimSoc {
    fn read_u32(&self, address: u64) -> u32 {
        self.state.lock().read(address)
    }

    fn write_u32(&self, address: u64, value: u32) {
        self.state.lock().write(address, value)
    }

    fn memory_barrier(&self) {}

    fn stall(&self, duration: Duration) {
        self.state.lock().now += duration;
    }
}

impl SimSoc {
    /// A SoC with no ports, for register-level tests.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A SoC modelling every controller of `topology`. Ports start with no
    /// link partner and no device.
    pub fn new(topology: &Topology) -> Self {
        let variant = topology.variant();
        let mut sim = Self::empty();
        for c in topology.controllers() {
            if let IatuLayout::Viewport = variant.iatu {
                sim = sim.with_viewport(c.dbi_base);
            }
            if !variant.phy_tuning.is_empty() {
                sim = sim.with_phy(c.dbi_base);
            }
            sim.state.get_mut().ports.push(SimPort {
                variant,
                index: c.index,
                dbi: c.dbi_base,
                control: c.control_base,
                config: c.config_base,
                config_size: c.config_size,
                training: vec![Training::NoPartner],
                ltssm_enables: 0,
                enabled_at: None,
                speed_override: None,
                lost: false,
                retrain: None,
                retrain_script: VecDeque::new(),
                retrain_requests: 0,
                device: None,
                reset_done_stuck: false,
            });
        }
        sim
    }

    /// Banks the iATU viewport of the DBI at `dbi`.
    pub fn with_viewport(mut self, dbi: u64) -> Self {
        self.state.get_mut().viewports.insert(dbi, 0);
        self
    }

    /// Models the PHY port of the DBI at `dbi`.
    pub fn with_phy(mut self, dbi: u64) -> Self {
        self.state.get_mut().phys.insert(dbi, SimPhy::default());
        self
    }

    /// Sets the training behavior of successive LTSSM enables; the last
    /// entry repeats.
    pub fn script(&self, index: u32, training: impl IntoIterator<Item = Training>) {
        self.state.lock().port_mut(index).training = training.into_iter().collect();
    }

    /// Puts a device behind the port, replacing any previous one.
    pub fn attach(&self, index: u32, device: SimDevice) {
        self.state.lock().port_mut(index).device = Some(device);
    }

    /// Queues the result of the next retrain request.
    pub fn queue_retrain(&self, index: u32, result: RetrainResult) {
        self.state
            .lock()
            .port_mut(index)
            .retrain_script
            .push_back(result);
    }

    /// Brings the link up immediately, outside of any bring-up flow.
    pub fn force_link_up(&self, index: u32, speed: u8, width: u8) {
        let mut state = self.state.lock();
        let now = state.now;
        let port = state.port_mut(index);
        port.training = vec![Training::LinkUp {
            after: Duration::ZERO,
            speed,
            width,
        }];
        port.ltssm_enables += 1;
        port.enabled_at = Some(now);
        let address = port.control + port.variant.control.ltssm_control as u64;
        let enable = port.variant.control.ltssm_enable;
        *state.registers.entry(address).or_default() |= enable;
    }

    pub fn set_reset_done_stuck(&self, index: u32, stuck: bool) {
        self.state.lock().port_mut(index).reset_done_stuck = stuck;
    }

    pub fn set_phy_stuck(&self, dbi: u64, stuck: bool) {
        self.state.lock().phys.get_mut(&dbi).unwrap().stuck = stuck;
    }

    pub fn phy_register(&self, dbi: u64, address: u32) -> u32 {
        self.state.lock().phys[&dbi]
            .registers
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_phy_register(&self, dbi: u64, address: u32, value: u32) {
        self.state
            .lock()
            .phys
            .get_mut(&dbi)
            .unwrap()
            .registers
            .insert(address, value);
    }

    /// Virtual time, advanced only by `stall`.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Reads the backing store, bypassing all device behavior.
    pub fn peek(&self, address: u64) -> u32 {
        self.state
            .lock()
            .registers
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    /// Writes the backing store without logging or side effects.
    pub fn poke(&self, address: u64, value: u32) {
        self.state.lock().registers.insert(address, value);
    }

    /// Every register write so far, in order.
    pub fn writes(&self) -> Vec<(u64, u32)> {
        self.state.lock().writes.clone()
    }

    /// Plain and banked register contents.
    pub fn register_snapshot(&self) -> (BTreeMap<u64, u32>, BTreeMap<(u64, u32, u16), u32>) {
        let state = self.state.lock();
        (
            state.registers.iter().map(|(&k, &v)| (k, v)).collect(),
            state.iatu_banks.iter().map(|(&k, &v)| (k, v)).collect(),
        )
    }

    pub fn ltssm_enables(&self, index: u32) -> u32 {
        self.state.lock().port(index).ltssm_enables
    }

    pub fn ltssm_enabled(&self, index: u32) -> bool {
        let state = self.state.lock();
        let port = state.port(index);
        let control = &port.variant.control;
        state
            .registers
            .get(&(port.control + control.ltssm_control as u64))
            .is_some_and(|v| v & control.ltssm_enable != 0)
    }

    pub fn retrain_requests(&self, index: u32) -> u32 {
        self.state.lock().port(index).retrain_requests
    }

    /// Outbound region `region` of the controller whose DBI is at `dbi`.
    pub fn iatu_region(&self, variant: &SocVariant, dbi: u64, region: u32) -> SimIatuRegion {
        let state = self.state.lock();
        let regs = match variant.iatu {
            IatuLayout::Viewport => iatu::VIEWPORT_REGISTERS,
            IatuLayout::Unrolled { .. } => iatu::UNROLLED_REGISTERS,
        };
        let get = |offset: u16| match variant.iatu {
            IatuLayout::Viewport => state
                .iatu_banks
                .get(&(dbi, region, offset))
                .copied()
                .unwrap_or(0),
            IatuLayout::Unrolled { offset: base } => {
                let stride = region as u64 * iatu::UNROLLED_REGION_STRIDE;
                let address = dbi + base + stride + offset as u64;
                state.registers.get(&address).copied().unwrap_or(0)
            }
        };
        SimIatuRegion {
            control_1: get(regs.control_1),
            control_2: get(regs.control_2),
            lower_base: get(regs.lower_base),
            upper_base: get(regs.upper_base),
            limit: get(regs.limit),
            upper_limit: get(regs.upper_limit),
            lower_target: get(regs.lower_target),
            upper_target: get(regs.upper_target),
        }
    }
}
