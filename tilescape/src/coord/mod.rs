//! Web Mercator projection utilities.
//!
//! Pure conversions between geographic coordinates (latitude/longitude),
//! absolute pixel coordinates at a zoom level, and tile grid indices. The
//! scheduler consumes these as stateless helpers; nothing in this module
//! holds state and identical inputs always produce identical outputs.

mod types;

pub use types::{
    CoordError, TileCoord, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM, TILE_SIZE,
};

use std::f64::consts::PI;

/// Side length of the pixel plane at the given zoom level.
#[inline]
fn map_size(zoom: u8) -> f64 {
    f64::from(TILE_SIZE) * 2.0_f64.powi(i32::from(zoom))
}

/// Number of tiles along one axis at the given zoom level.
#[inline]
fn grid_size(zoom: u8) -> u32 {
    1u32 << u32::from(zoom.min(MAX_ZOOM))
}

/// Converts a longitude to an absolute pixel X coordinate.
///
/// # Errors
///
/// Returns `CoordError` if the longitude is outside ±180 degrees or the
/// zoom level is above [`MAX_ZOOM`].
#[inline]
pub fn lon_to_pixel_x(lon: f64, zoom: u8) -> Result<f64, CoordError> {
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    Ok((lon + 180.0) / 360.0 * map_size(zoom))
}

/// Converts a latitude to an absolute pixel Y coordinate.
///
/// # Errors
///
/// Returns `CoordError` if the latitude is outside the Web Mercator range
/// or the zoom level is above [`MAX_ZOOM`].
#[inline]
pub fn lat_to_pixel_y(lat: f64, zoom: u8) -> Result<f64, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let lat_rad = lat * PI / 180.0;
    Ok((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * map_size(zoom))
}

/// Converts an absolute pixel X coordinate back to a longitude.
#[inline]
pub fn pixel_x_to_lon(pixel_x: f64, zoom: u8) -> f64 {
    pixel_x / map_size(zoom) * 360.0 - 180.0
}

/// Converts an absolute pixel Y coordinate back to a latitude.
#[inline]
pub fn pixel_y_to_lat(pixel_y: f64, zoom: u8) -> f64 {
    let y = pixel_y / map_size(zoom);
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    lat_rad * 180.0 / PI
}

/// Converts an absolute pixel coordinate to a tile index, clamped to the
/// grid so that positions off the edge of the map resolve to the border
/// tile rather than wrapping.
#[inline]
pub fn pixel_to_tile(pixel: f64, zoom: u8) -> u32 {
    let max_index = grid_size(zoom) - 1;
    let index = (pixel / f64::from(TILE_SIZE)).floor();
    if index < 0.0 {
        0
    } else if index > f64::from(max_index) {
        max_index
    } else {
        index as u32
    }
}

/// Absolute pixel coordinate of a tile's left/top edge.
#[inline]
pub fn tile_to_pixel(tile: u32) -> f64 {
    f64::from(tile) * f64::from(TILE_SIZE)
}
