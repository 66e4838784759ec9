// Pins SHA-256 digests for the built-in model artifacts. A digest comes from
// the matching environment variable, or from checksums/<entry>.sha256.
// Artifacts without a pinned digest are refused at resolution time.
const PINNED: &[(&str, &str)] = &[
    ("yolov8n", "GLANCE_SHA256_YOLOV8N"),
    ("yolov8m", "GLANCE_SHA256_YOLOV8M"),
    ("resnet50", "GLANCE_SHA256_RESNET50"),
    ("mobilenetv4", "GLANCE_SHA256_MOBILENETV4"),
    ("imagenet-labels", "GLANCE_SHA256_IMAGENET_LABELS"),
];

fn main() {
    for (entry, var) in PINNED {
        let digest = std::env::var(var)
            .ok()
            .or_else(|| read_checksum(&format!("checksums/{entry}.sha256")));
        match digest {
            Some(digest) => println!("cargo:rustc-env={}={}", var, digest),
            None => println!("cargo:warning=no SHA-256 pinned for {entry}; set {var} or add checksums/{entry}.sha256"),
        }
        println!("cargo:rerun-if-env-changed={}", var);
    }
    println!("cargo:rerun-if-changed=checksums");
}

fn read_checksum(path: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let digest = content.split_whitespace().next()?.to_lowercase();
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest)
    } else {
        None
    }
}
