//! Human-readable descriptions for the 4CC codes that appear as IM4P
//! component tags and IM4M property names.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static FOURCC_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();

    // Boot chain components
    map.insert("ibot", "iBoot");
    map.insert("ibec", "iBEC (recovery/restore bootloader)");
    map.insert("ibss", "iBSS (early-stage bootloader)");
    map.insert("ibdt", "iBoot Data");

    // Restore components
    map.insert("rdsk", "Restore RamDisk");
    map.insert("rdtr", "Restore DeviceTree");
    map.insert("rkrn", "Restore KernelCache");
    map.insert("rlgo", "Restore Logo");
    map.insert("rosi", "RestoreOS");
    map.insert("rtsc", "Restore Trust Cache");

    // Kernel and system
    map.insert("krnl", "KernelCache");
    map.insert("dtre", "DeviceTree");
    map.insert("isys", "System Volume Root Hash");
    map.insert("csys", "Base System Volume Root Hash");
    map.insert("trst", "Static Trust Cache");
    map.insert("bstc", "Base System Trust Cache");
    map.insert("logo", "Boot Logo");
    map.insert("sepi", "SEP Firmware");

    // Coprocessor firmware
    map.insert("anef", "ANE Firmware (Neural Engine)");
    map.insert("aopf", "AOP Firmware (Always-On Processor)");
    map.insert("avef", "AVE Firmware (Video Encoder)");
    map.insert("dcp2", "Display Coprocessor 2 Firmware");
    map.insert("gfxf", "GPU Firmware");
    map.insert("mtfw", "Multitouch Firmware");
    map.insert("pmcf", "PMC Firmware (Power Management)");
    map.insert("siof", "SmartIO Firmware");
    map.insert("sptm", "Secure Page Table Monitor");
    map.insert("trxm", "Trusted Execution Monitor");

    // Manifest structure tags
    map.insert("MANB", "Manifest Body");
    map.insert("MANP", "Manifest Properties");

    // Manifest properties
    map.insert("BORD", "Board Identifier");
    map.insert("CEPO", "Chip Epoch");
    map.insert("CHIP", "Chip Identifier");
    map.insert("CPRO", "Certificate Production Status");
    map.insert("CSEC", "Certificate Security Mode");
    map.insert("ECID", "Exclusive Chip ID");
    map.insert("SDOM", "Security Domain");
    map.insert("EPRO", "Effective Production Status");
    map.insert("ESEC", "Effective Security Mode");
    map.insert("AMNM", "Allow Mix-n-Match");
    map.insert("BNCN", "Boot Nonce");
    map.insert("DGST", "Payload Digest");
    map.insert("love", "Long OS Version");
    map.insert("prtp", "Platform Identifier");
    map.insert("sdkp", "SDK Platform");
    map.insert("snon", "Secure Nonce");
    map.insert("tstp", "Timestamp");

    map
});

/// Get the description for any known 4CC code (component or property).
pub fn get_description(code: &str) -> Option<String> {
    FOURCC_MAP.get(code).map(|s| s.to_string())
}

/// Format a 4CC code with its description if available.
pub fn format_with_description(code: &str) -> String {
    match get_description(code) {
        Some(desc) => format!("{} ({})", code, desc),
        None => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(get_description("ibot"), Some("iBoot".to_string()));
        assert_eq!(get_description("krnl"), Some("KernelCache".to_string()));
        assert_eq!(get_description("MANB"), Some("Manifest Body".to_string()));
        assert_eq!(get_description("CEPO"), Some("Chip Epoch".to_string()));
    }

    #[test]
    fn unknown_code() {
        assert!(get_description("ZZZZ").is_none());
        assert_eq!(format_with_description("ZZZZ"), "ZZZZ");
    }

    #[test]
    fn formatted() {
        assert_eq!(format_with_description("ibot"), "ibot (iBoot)");
    }
}
