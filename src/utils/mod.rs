pub mod image_processor;
pub mod naming;

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if bytes as f64 >= MB {
        format!("{:.2}MiB", bytes as f64 / MB)
    } else if bytes as f64 >= KB {
        format!("{:.2}kb", bytes as f64 / KB)
    } else {
        format!("{}b", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::format_size;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512b");
        assert_eq!(format_size(2048), "2.00kb");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00MiB");
    }
}
