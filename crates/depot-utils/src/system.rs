/// Returns the Android-style native ABIs the host CPU can execute, most specific first.
///
/// Used as the default device profile when none is configured.
pub fn host_abis() -> Vec<String> {
    let abis: &[&str] = match std::env::consts::ARCH {
        "x86_64" => &["x86_64", "x86"],
        "x86" => &["x86"],
        "aarch64" => &["arm64-v8a", "armeabi-v7a", "armeabi"],
        "arm" => &["armeabi-v7a", "armeabi"],
        "riscv64" => &["riscv64"],
        _ => &[],
    };
    abis.iter().map(|abi| abi.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_abis() {
        #[cfg(target_arch = "x86_64")]
        assert_eq!(host_abis(), vec!["x86_64", "x86"]);

        #[cfg(target_arch = "aarch64")]
        assert_eq!(host_abis()[0], "arm64-v8a");
    }
}
