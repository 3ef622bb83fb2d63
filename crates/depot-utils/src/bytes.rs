/// Formats a number of bytes into a human-readable string such as `1.50 MiB`.
///
/// ```
/// use depot_utils::bytes::format_bytes;
///
/// assert_eq!(format_bytes(1024 * 1024, 2), "1.00 MiB");
/// ```
pub fn format_bytes(bytes: u64, precision: usize) -> String {
    let unit = 1024.0;
    let sizes = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    if bytes == 0 {
        return format!("{:.*} {}", precision, 0.0, sizes[0]);
    }

    let idx = ((bytes as f64).log(unit).floor() as usize).min(sizes.len() - 1);

    format!(
        "{:.*} {}",
        precision,
        bytes as f64 / unit.powi(idx as i32),
        sizes[idx]
    )
}

#[cfg(test)]
mod tests {
    use super::format_bytes;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0, 0), "0 B");
        assert_eq!(format_bytes(512, 0), "512 B");
        assert_eq!(format_bytes(1536, 1), "1.5 KiB");
        assert_eq!(format_bytes(1024_u64.pow(3), 2), "1.00 GiB");
    }
}
