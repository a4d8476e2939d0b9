//! Launch geometry selection shared by the engines.

use gridscan_core::{DeviceInfo, ExecutionUnit, LaunchGeometry, PrimitivesConfig};

/// Lanes per group: the configured override clamped to the unit's maximum.
pub(crate) fn lanes_per_group(info: &DeviceInfo, config: &PrimitivesConfig) -> usize {
    config
        .lanes_per_group
        .unwrap_or(info.max_lanes_per_group)
        .clamp(1, info.max_lanes_per_group.max(1))
}

/// Full-occupancy geometry, narrowed by a configured group count.
///
/// Every group of the result is guaranteed to be resident at once, and the
/// launch fits the unit's lane limit even if `occupancy` ignores it.
pub(crate) fn resident_geometry<E: ExecutionUnit>(
    unit: &E,
    config: &PrimitivesConfig,
) -> LaunchGeometry {
    let occupancy = unit.occupancy(lanes_per_group(unit.info(), config));
    let lanes = occupancy.lanes_per_group.max(1);
    let launchable = (unit.info().max_launch_lanes / lanes).max(1);
    let groups = config
        .group_count
        .map_or(occupancy.group_count, |g| g.min(occupancy.group_count))
        .min(launchable);
    LaunchGeometry::new(groups.max(1), lanes)
}

/// Geometry for kernels that never wait on other groups.
///
/// Uses the configured group count (or the unit's compute units), without
/// more groups than there are lanes' worth of elements, and within the
/// unit's launch limit.
pub(crate) fn grid_geometry<E: ExecutionUnit>(
    unit: &E,
    config: &PrimitivesConfig,
    length: usize,
) -> LaunchGeometry {
    let info = unit.info();
    let lanes = lanes_per_group(info, config);
    let max_groups = (info.max_launch_lanes / lanes).max(1);
    let groups = config
        .group_count
        .unwrap_or(info.compute_units)
        .min(length.div_ceil(lanes))
        .clamp(1, max_groups);
    LaunchGeometry::new(groups, lanes)
}
