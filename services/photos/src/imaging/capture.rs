use crate::model::{CaptureMetadata, GeoPoint};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use exif::{Exif, In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Best-effort capture time and GPS position from the file's EXIF block.
///
/// Never fails: unreadable or missing EXIF yields empty metadata, and the
/// date and location are extracted independently of each other.
pub fn read_capture_metadata(path: &Path) -> CaptureMetadata {
    let exif = match read_exif(path) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(error = %e, "No usable EXIF data");
            return CaptureMetadata::default();
        }
    };

    CaptureMetadata {
        date: capture_date(&exif),
        location: capture_location(&exif),
    }
}

fn read_exif(path: &Path) -> Result<Exif, exif::Error> {
    let file = File::open(path)?;
    exif::Reader::new().read_from_container(&mut BufReader::new(file))
}

/// DateTimeOriginal, falling back to DateTime
fn capture_date(exif: &Exif) -> Option<DateTime<Utc>> {
    [Tag::DateTimeOriginal, Tag::DateTime]
        .iter()
        .filter_map(|tag| exif.get_field(*tag, In::PRIMARY))
        .find_map(|field| match &field.value {
            Value::Ascii(values) => values.first().and_then(|raw| parse_exif_datetime(raw)),
            _ => None,
        })
}

/// Parse "YYYY:MM:DD HH:MM:SS"; EXIF carries no zone so the value is taken as UTC
fn parse_exif_datetime(raw: &[u8]) -> Option<DateTime<Utc>> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    let naive = NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?
        .and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)?;
    Some(Utc.from_utc_datetime(&naive))
}

fn capture_location(exif: &Exif) -> Option<GeoPoint> {
    let latitude = gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let longitude = gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;
    let point = GeoPoint {
        latitude,
        longitude,
    };
    point.is_valid().then_some(point)
}

fn gps_coordinate(exif: &Exif, coord_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let coord_field = exif.get_field(coord_tag, In::PRIMARY)?;
    let ref_field = exif.get_field(ref_tag, In::PRIMARY)?;

    let dms = match &coord_field.value {
        Value::Rational(r) if r.len() >= 3 => [r[0].to_f64(), r[1].to_f64(), r[2].to_f64()],
        _ => return None,
    };

    let negative = match &ref_field.value {
        Value::Ascii(values) => values
            .first()
            .and_then(|v| v.first())
            .map(|b| b.to_ascii_uppercase() == negative_ref)?,
        _ => return None,
    };

    Some(dms_to_decimal(dms, negative))
}

fn dms_to_decimal([degrees, minutes, seconds]: [f64; 3], negative: bool) -> f64 {
    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if negative {
        -decimal
    } else {
        decimal
    }
}
