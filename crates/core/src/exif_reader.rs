use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use exif::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const CAPTURE_TAGS: &[&str] = &["DateTimeOriginal", "DateTimeDigitized", "DateTime"];
const ZONED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y:%m:%d %H:%M:%S%:z"];
const NAIVE_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

pub fn read_capture_time(path: &Path) -> Result<Option<DateTime<Local>>> {
    let file = File::open(path)
        .with_context(|| format!("cannot open file for EXIF: {}", path.display()))?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut buf)
        .with_context(|| format!("cannot parse EXIF: {}", path.display()))?;

    Ok(find_field_value(&exif, CAPTURE_TAGS).and_then(|raw| parse_date(&raw)))
}

fn find_field_value(exif: &exif::Exif, names: &[&str]) -> Option<String> {
    // tag priority follows `names`, not field order in the container
    names.iter().find_map(|name| {
        exif.fields().find_map(|field| {
            let tag_name = format!("{:?}", field.tag);
            if name.eq_ignore_ascii_case(&tag_name) {
                Some(field.display_value().to_string())
            } else {
                None
            }
        })
    })
}

pub(crate) fn parse_date(input: &str) -> Option<DateTime<Local>> {
    let input = input.trim().trim_matches('"');
    ZONED_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(input, fmt).ok())
        .map(|zoned| zoned.with_timezone(&Local))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        })
}
