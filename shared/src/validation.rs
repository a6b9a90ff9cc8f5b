//! Validation utilities for seed import and query parameters

/// Validate a location name (non-empty, fits the column)
pub fn validate_location_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Location name cannot be empty");
    }
    if name.len() > 255 {
        return Err("Location name must be at most 255 characters");
    }
    Ok(())
}

/// Validate latitude is within -90..=90 degrees
pub fn validate_latitude(latitude: f64) -> Result<(), &'static str> {
    if !latitude.is_finite() {
        return Err("Latitude must be a finite number");
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err("Latitude must be between -90 and 90");
    }
    Ok(())
}

/// Validate longitude is within -180..=180 degrees
pub fn validate_longitude(longitude: f64) -> Result<(), &'static str> {
    if !longitude.is_finite() {
        return Err("Longitude must be a finite number");
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}
