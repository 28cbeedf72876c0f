// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Controller discovery from the device tree.

use crate::dt;
use crate::dt::DtError;
use crate::dt::PropertyNode;
use crate::dt::TopologySource;
use crate::dt::cells_to_u64;
use crate::soc::RegLayout;
use crate::soc::SocVariant;
use baikal_pcie_defs::caps::pci_express::LinkSpeed;
use baikal_pcie_defs::dw::iatu::MAX_WINDOW_SIZE;
use baikal_pcie_defs::dw::iatu::MIN_WINDOW_SIZE;
use baikal_pcie_defs::dw::iatu::WINDOW_ALIGNMENT;
use baikal_pcie_defs::gpio;
use thiserror::Error;

/// Config window bytes per bus in shift mode.
pub const BUS_WINDOW_SIZE: u64 = 1 << 20;
/// Smallest config window: bus 0 through CFG0 plus at least one bus
/// through CFG1.
pub const MIN_CONFIG_WINDOW_SIZE: u64 = 2 * BUS_WINDOW_SIZE;
/// Retrain ceiling when the node does not set `max-link-speed`.
pub const DEFAULT_MAX_LINK_SPEED: u8 = LinkSpeed::Gen3.into_bits();

/// A configured lane width.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LaneCount {
    /// x1
    X1 = 1,
    /// x2
    X2 = 2,
    /// x4
    X4 = 4,
    /// x8
    X8 = 8,
    /// x16
    X16 = 16,
    /// x32
    X32 = 32,
}

impl LaneCount {
    /// Maps a lane count to a supported width.
    pub fn from_count(lanes: u32) -> Option<Self> {
        Some(match lanes {
            1 => Self::X1,
            2 => Self::X2,
            4 => Self::X4,
            8 => Self::X8,
            16 => Self::X16,
            32 => Self::X32,
            _ => return None,
        })
    }

    /// Number of lanes.
    pub fn count(self) -> u32 {
        self as u32
    }

    /// `PORT_LINK_CTRL.LINK_CAPABLE` encoding.
    pub fn link_capable(self) -> u32 {
        (self.count() << 1) - 1
    }

    /// `GEN2_CTRL.NUM_OF_LANES` encoding. The field stops at x16, wider
    /// ports keep the strap value.
    pub fn gen2_num_lanes(self) -> Option<u32> {
        (self.count() <= 16).then_some(self.count())
    }
}

/// Address space of a translation window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WindowKind {
    /// I/O space.
    Io,
    /// 32-bit memory space.
    Mem32,
    /// 64-bit memory space.
    Mem64,
}

/// A CPU to PCI address translation window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Window {
    /// Address space.
    pub kind: WindowKind,
    /// CPU physical base, as configured (before any SoC address masking).
    pub cpu_base: u64,
    /// PCI bus address base.
    pub pci_base: u64,
    /// Size in bytes.
    pub size: u64,
}

/// The PERST# line of a port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResetGpio {
    /// Pin on the SoC's PERST# GPIO controller.
    pub pin: u32,
    /// PERST# is asserted by driving the pin low.
    pub active_low: bool,
}

/// Everything needed to bring up one root port.
#[derive(Debug, Clone)]
pub struct ControllerDescriptor {
    /// Controller number. Selects SoC register slices and doubles as the
    /// PCI segment number.
    pub index: u32,
    /// Device tree node name.
    pub name: String,
    /// DBI register block.
    pub dbi_base: u64,
    /// Reset/LTSSM control block (LCRU slice or APB block).
    pub control_base: u64,
    /// Config window CPU base.
    pub config_base: u64,
    /// Config window size, at least [`MIN_CONFIG_WINDOW_SIZE`].
    pub config_size: u64,
    /// Lane width override, `None` to keep the reset strap.
    pub lanes: Option<LaneCount>,
    /// I/O and memory windows, in device tree order.
    pub windows: Vec<Window>,
    /// PERST# line, `None` for ports without one.
    pub reset_gpio: Option<ResetGpio>,
    /// Root complex number tagged onto MSIs (BM1000).
    pub msi_routing_id: Option<u8>,
    /// Ceiling for late retraining.
    pub max_link_speed: u8,
}

impl ControllerDescriptor {
    /// The first window of `kind`.
    pub fn window(&self, kind: WindowKind) -> Option<&Window> {
        self.windows.iter().find(|w| w.kind == kind)
    }
}

/// Reasons a controller node is dropped.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// A required property is absent.
    #[error("missing required property {0}")]
    MissingProperty(&'static str),
    /// A property could not be decoded.
    #[error("failed to decode property {name}")]
    Property {
        /// Property name
        name: &'static str,
        /// Decode error
        #[source]
        source: DtError,
    },
    /// A property decoded but has the wrong shape.
    #[error("property {name} is malformed: {reason}")]
    Malformed {
        /// Property name
        name: &'static str,
        /// What is wrong
        reason: &'static str,
    },
    /// `reg-names` does not name a required region.
    #[error("no {0} region in reg")]
    MissingRegion(&'static str),
    /// The declared index exceeds the SoC's controller count.
    #[error("controller index {index} is out of range, the SoC has {count} controllers")]
    IndexOutOfRange {
        /// Declared index
        index: u32,
        /// Controllers on the SoC
        count: u32,
    },
    /// The DBI base is not one of the SoC's controllers.
    #[error("dbi base {0:#x} does not belong to any controller")]
    UnknownController(u64),
    /// A register region is empty or unaligned.
    #[error("{region} region {base:#x}+{size:#x} is invalid")]
    InvalidRegion {
        /// Region name
        region: &'static str,
        /// Base address
        base: u64,
        /// Size
        size: u64,
    },
    /// The config window cannot hold CFG0 and CFG1.
    #[error("config window size {0:#x} is below 2 MiB")]
    ConfigWindowTooSmall(u64),
    /// A translation window violates the iATU granule.
    #[error(
        "{kind:?} window cpu {cpu_base:#x} pci {pci_base:#x} size {size:#x} is not 64 KiB aligned"
    )]
    MisalignedWindow {
        /// Address space
        kind: WindowKind,
        /// CPU base
        cpu_base: u64,
        /// PCI base
        pci_base: u64,
        /// Size
        size: u64,
    },
    /// A translation window the iATU cannot map in one region.
    #[error("{kind:?} window size {size:#x} is outside [64 KiB, 4 GiB)")]
    WindowSize {
        /// Address space
        kind: WindowKind,
        /// Size
        size: u64,
    },
    /// A translation window runs past the end of the address space.
    #[error("{kind:?} window cpu {cpu_base:#x} pci {pci_base:#x} size {size:#x} wraps")]
    WindowOverflow {
        /// Address space
        kind: WindowKind,
        /// CPU base
        cpu_base: u64,
        /// PCI base
        pci_base: u64,
        /// Size
        size: u64,
    },
    /// Another node already claimed the index.
    #[error("controller index {0} is claimed by an earlier node")]
    DuplicateIndex(u32),
}

/// The enabled, well-formed controllers of one SoC, ordered by index.
#[derive(Debug)]
pub struct Topology {
    variant: &'static SocVariant,
    controllers: Vec<ControllerDescriptor>,
}

impl Topology {
    /// Loads every controller node of `variant` from `source`.
    ///
    /// Disabled nodes are skipped. Malformed nodes are logged and dropped,
    /// leaving their hardware untouched. The result may be empty.
    pub fn load(source: &dyn TopologySource, variant: &'static SocVariant) -> Self {
        let mut controllers: Vec<ControllerDescriptor> = Vec::new();
        for node in source.compatible_nodes(variant.compatible) {
            if !dt::is_enabled(node) {
                tracing::debug!(node = node.name(), "pcie controller disabled");
                continue;
            }
            let result = parse_controller(node, variant).and_then(|controller| {
                if controllers.iter().any(|c| c.index == controller.index) {
                    Err(TopologyError::DuplicateIndex(controller.index))
                } else {
                    Ok(controller)
                }
            });
            match result {
                Ok(controller) => {
                    tracing::info!(
                        node = node.name(),
                        controller = controller.index,
                        lanes = ?controller.lanes,
                        windows = controller.windows.len(),
                        "pcie controller found"
                    );
                    controllers.push(controller);
                }
                Err(err) => {
                    tracing::warn!(
                        node = node.name(),
                        soc = variant.name,
                        error = &err as &dyn std::error::Error,
                        "skipping pcie controller"
                    );
                }
            }
        }
        controllers.sort_by_key(|c| c.index);
        Self {
            variant,
            controllers,
        }
    }

    /// The silicon variant.
    pub fn variant(&self) -> &'static SocVariant {
        self.variant
    }

    /// Controllers ordered by index.
    pub fn controllers(&self) -> &[ControllerDescriptor] {
        &self.controllers
    }

    /// Number of controllers.
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// True when no controller was found.
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub(crate) fn into_controllers(self) -> Vec<ControllerDescriptor> {
        self.controllers
    }
}

fn cells(node: &dyn PropertyNode, name: &'static str) -> Result<Option<Vec<u32>>, TopologyError> {
    dt::read_cells(node, name).map_err(|source| TopologyError::Property { name, source })
}

fn required_cells(node: &dyn PropertyNode, name: &'static str) -> Result<Vec<u32>, TopologyError> {
    cells(node, name)?.ok_or(TopologyError::MissingProperty(name))
}

fn single_cell(node: &dyn PropertyNode, name: &'static str) -> Result<Option<u32>, TopologyError> {
    match cells(node, name)?.as_deref() {
        None => Ok(None),
        Some(&[value]) => Ok(Some(value)),
        Some(_) => Err(TopologyError::Malformed {
            name,
            reason: "expected a single cell",
        }),
    }
}

fn is_aligned(value: u64) -> bool {
    value.is_multiple_of(WINDOW_ALIGNMENT)
}

/// True when `base..base + size` is non-empty and ends at or below
/// `u64::MAX`.
fn fits(base: u64, size: u64) -> bool {
    size != 0 && base.checked_add(size - 1).is_some()
}

fn parse_controller(
    node: &dyn PropertyNode,
    variant: &SocVariant,
) -> Result<ControllerDescriptor, TopologyError> {
    let reg = required_cells(node, "reg")?;
    if reg.is_empty() || !reg.len().is_multiple_of(4) {
        return Err(TopologyError::Malformed {
            name: "reg",
            reason: "expected <address size> entries of two cells each",
        });
    }
    let regions: Vec<(u64, u64)> = reg
        .chunks_exact(4)
        .map(|c| (cells_to_u64(c[0], c[1]), cells_to_u64(c[2], c[3])))
        .collect();

    let (index, dbi, control_base, config) = match variant.reg_layout {
        RegLayout::Named {
            control_base,
            control_stride,
        } => {
            let names = dt::read_strings(node, "reg-names")
                .map_err(|source| TopologyError::Property {
                    name: "reg-names",
                    source,
                })?
                .ok_or(TopologyError::MissingProperty("reg-names"))?;
            let region = |name: &'static str| {
                names
                    .iter()
                    .position(|n| *n == name)
                    .and_then(|i| regions.get(i).copied())
                    .ok_or(TopologyError::MissingRegion(name))
            };
            let dbi = region("dbi")?;
            let config = region("config")?;
            // Either <index> or <phandle index>.
            let index = *required_cells(node, "baikal,pcie-lcru")?
                .last()
                .ok_or(TopologyError::Malformed {
                    name: "baikal,pcie-lcru",
                    reason: "empty",
                })?;
            if index >= variant.controller_count {
                return Err(TopologyError::IndexOutOfRange {
                    index,
                    count: variant.controller_count,
                });
            }
            (
                index,
                dbi,
                control_base + index as u64 * control_stride,
                config,
            )
        }
        RegLayout::Positional { dbi_bases } => {
            let &[dbi, apb, config] = regions.as_slice() else {
                return Err(TopologyError::Malformed {
                    name: "reg",
                    reason: "expected dbi, apb and config regions",
                });
            };
            let index = dbi_bases
                .iter()
                .position(|&base| base == dbi.0)
                .ok_or(TopologyError::UnknownController(dbi.0))? as u32;
            if apb.0 == 0 || !fits(apb.0, apb.1) {
                return Err(TopologyError::InvalidRegion {
                    region: "apb",
                    base: apb.0,
                    size: apb.1,
                });
            }
            (index, dbi, apb.0, config)
        }
    };

    let (dbi_base, dbi_size) = dbi;
    if dbi_base == 0 || !fits(dbi_base, dbi_size) {
        return Err(TopologyError::InvalidRegion {
            region: "dbi",
            base: dbi_base,
            size: dbi_size,
        });
    }
    let (config_base, config_size) = config;
    // CFG1 covers everything past the first bus and must fit one region.
    if config_base == 0
        || !is_aligned(config_base)
        || !is_aligned(config_size)
        || !fits(config_base, config_size)
        || config_size.saturating_sub(BUS_WINDOW_SIZE) >= MAX_WINDOW_SIZE
    {
        return Err(TopologyError::InvalidRegion {
            region: "config",
            base: config_base,
            size: config_size,
        });
    }
    if config_size < MIN_CONFIG_WINDOW_SIZE {
        return Err(TopologyError::ConfigWindowTooSmall(config_size));
    }

    let windows = parse_ranges(node)?;

    let lanes = match single_cell(node, "num-lanes")? {
        None | Some(0) => None,
        Some(count) => {
            let lanes = LaneCount::from_count(count);
            if lanes.is_none() {
                tracing::warn!(
                    node = node.name(),
                    count,
                    "unsupported lane count, keeping strap width"
                );
            }
            lanes
        }
    };

    let max_link_speed = match single_cell(node, "max-link-speed")? {
        None => DEFAULT_MAX_LINK_SPEED,
        Some(speed) => match u8::try_from(speed).ok().and_then(LinkSpeed::from_bits) {
            Some(speed) => speed.into_bits(),
            None => {
                tracing::warn!(node = node.name(), speed, "invalid max-link-speed");
                DEFAULT_MAX_LINK_SPEED
            }
        },
    };

    let reset_gpio = match cells(node, "reset-gpios")?.as_deref() {
        None => None,
        // <pin flags> or <phandle pin flags>
        Some(&[.., pin, flags]) => {
            if pin >= gpio::PINS {
                return Err(TopologyError::Malformed {
                    name: "reset-gpios",
                    reason: "pin out of range",
                });
            }
            Some(ResetGpio {
                pin,
                active_low: flags & 1 != 0,
            })
        }
        Some(_) => {
            return Err(TopologyError::Malformed {
                name: "reset-gpios",
                reason: "expected <pin flags>",
            });
        }
    };

    let msi_routing_id = if variant.msi_translation.is_some() {
        match cells(node, "msi-map")?.as_deref() {
            None => None,
            // <rid-base phandle msi-base length>
            Some(&[_, _, msi_base, _]) => Some(((msi_base >> 16) & 3) as u8),
            Some(_) => {
                return Err(TopologyError::Malformed {
                    name: "msi-map",
                    reason: "expected <rid-base phandle msi-base length>",
                });
            }
        }
    } else {
        None
    };

    Ok(ControllerDescriptor {
        index,
        name: node.name().to_owned(),
        dbi_base,
        control_base,
        config_base,
        config_size,
        lanes,
        windows,
        reset_gpio,
        msi_routing_id,
        max_link_speed,
    })
}

/// Parses `ranges`: three PCI address cells, two CPU address cells and two
/// size cells per entry. The space code sits in bits 25:24 of the first
/// cell.
fn parse_ranges(node: &dyn PropertyNode) -> Result<Vec<Window>, TopologyError> {
    let Some(ranges) = cells(node, "ranges")? else {
        return Ok(Vec::new());
    };
    if !ranges.len().is_multiple_of(7) {
        return Err(TopologyError::Malformed {
            name: "ranges",
            reason: "expected entries of seven cells",
        });
    }
    let mut windows = Vec::new();
    for entry in ranges.chunks_exact(7) {
        let kind = match (entry[0] >> 24) & 3 {
            1 => WindowKind::Io,
            2 => WindowKind::Mem32,
            3 => WindowKind::Mem64,
            _ => continue,
        };
        let window = Window {
            kind,
            pci_base: cells_to_u64(entry[1], entry[2]),
            cpu_base: cells_to_u64(entry[3], entry[4]),
            size: cells_to_u64(entry[5], entry[6]),
        };
        if !(MIN_WINDOW_SIZE..MAX_WINDOW_SIZE).contains(&window.size) {
            return Err(TopologyError::WindowSize {
                kind,
                size: window.size,
            });
        }
        if !is_aligned(window.cpu_base)
            || !is_aligned(window.pci_base)
            || !is_aligned(window.size)
        {
            return Err(TopologyError::MisalignedWindow {
                kind,
                cpu_base: window.cpu_base,
                pci_base: window.pci_base,
                size: window.size,
            });
        }
        if !fits(window.cpu_base, window.size) || !fits(window.pci_base, window.size) {
            return Err(TopologyError::WindowOverflow {
                kind,
                cpu_base: window.cpu_base,
                pci_base: window.pci_base,
                size: window.size,
            });
        }
        windows.push(window);
    }
    Ok(windows)
}
