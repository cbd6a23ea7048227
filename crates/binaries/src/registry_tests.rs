// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn entry(version: &str, variant: Variant) -> BinaryEntry {
    let id = Uuid::new_v4();
    BinaryEntry {
        id,
        version: version.to_string(),
        variant,
        download_url: format!("https://example.test/{version}"),
        sha256: Some("a".repeat(64)),
        installed_at: Utc::now(),
        path: PathBuf::from(id.to_string()),
        size_bytes: 1024,
        executables: vec!["llama-server".to_string()],
        release: None,
    }
}

// ── Registry invariants ──────────────────────────────────────────────────────

#[test]
fn first_add_becomes_default() {
    let mut registry = BinaryRegistry::default();
    let first = entry("b100", Variant::LinuxX64);
    let first_id = first.id;
    registry.add(first).unwrap();
    assert_eq!(registry.default_binary_id, Some(first_id));

    let second = entry("b101", Variant::LinuxX64);
    registry.add(second).unwrap();
    // Default unchanged by later adds
    assert_eq!(registry.default_binary_id, Some(first_id));
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut registry = BinaryRegistry::default();
    let e = entry("b100", Variant::LinuxX64);
    let dup = e.clone();
    registry.add(e).unwrap();
    assert!(matches!(registry.add(dup), Err(BinaryError::Duplicate(_))));
    assert_eq!(registry.len(), 1);
}

#[test]
fn removing_default_promotes_first_remaining() {
    let mut registry = BinaryRegistry::default();
    let a = entry("b100", Variant::LinuxX64);
    let b = entry("b101", Variant::LinuxX64);
    let (a_id, b_id) = (a.id, b.id);
    registry.add(a).unwrap();
    registry.add(b).unwrap();

    registry.remove(a_id).unwrap();
    assert_eq!(registry.default_binary_id, Some(b_id));

    registry.remove(b_id).unwrap();
    assert_eq!(registry.default_binary_id, None);
    assert!(registry.is_empty());
}

#[test]
fn removing_non_default_keeps_default() {
    let mut registry = BinaryRegistry::default();
    let a = entry("b100", Variant::LinuxX64);
    let b = entry("b101", Variant::LinuxX64);
    let (a_id, b_id) = (a.id, b.id);
    registry.add(a).unwrap();
    registry.add(b).unwrap();

    registry.remove(b_id).unwrap();
    assert_eq!(registry.default_binary_id, Some(a_id));
}

#[test]
fn set_default_requires_existing_entry() {
    let mut registry = BinaryRegistry::default();
    assert!(!registry.set_default(Uuid::new_v4()));

    let e = entry("b100", Variant::LinuxX64);
    let id = e.id;
    registry.add(entry("b099", Variant::LinuxX64)).unwrap();
    registry.add(e).unwrap();
    assert!(registry.set_default(id));
    assert_eq!(registry.get_default().unwrap().id, id);
}

#[test]
fn lookup_by_version_and_variant() {
    let mut registry = BinaryRegistry::default();
    registry.add(entry("b100", Variant::LinuxX64)).unwrap();
    registry.add(entry("b100", Variant::WinVulkanX64)).unwrap();

    let found = registry.get_by_version("b100", Variant::WinVulkanX64).unwrap();
    assert_eq!(found.variant, Variant::WinVulkanX64);
    assert!(registry.get_by_version("b999", Variant::LinuxX64).is_none());
}

// ── Variant tags ─────────────────────────────────────────────────────────────

#[yare::parameterized(
    vulkan = { Variant::WinVulkanX64, "win-vulkan-x64", ".zip" },
    cuda   = { Variant::WinCuda124X64, "win-cuda-12.4-x64", ".zip" },
    linux  = { Variant::LinuxX64, "linux-x64", ".tar.gz" },
    macos  = { Variant::MacosArm64, "macos-arm64", ".tar.gz" },
)]
fn variant_tags_and_extensions(variant: Variant, tag: &str, ext: &str) {
    assert_eq!(variant.as_str(), tag);
    assert_eq!(variant.archive_ext(), ext);
    assert_eq!(Variant::parse(tag).unwrap(), variant);
}

#[test]
fn unknown_variant_tag_is_an_error() {
    assert!(matches!(
        Variant::parse("win-quantum-x128"),
        Err(BinaryError::UnknownVariant(_))
    ));
}

// ── Persistence ──────────────────────────────────────────────────────────────

#[test]
fn missing_registry_file_reads_as_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = RegistryManager::load(tmp.path()).unwrap();
    assert!(manager.registry().is_empty());
}

#[test]
fn save_load_round_trips_bytewise() {
    let tmp = tempfile::tempdir().unwrap();
    let mut manager = RegistryManager::load(tmp.path()).unwrap();
    manager.add(entry("b100", Variant::LinuxX64)).unwrap();
    manager.add(entry("b101", Variant::WinVulkanX64)).unwrap();

    let first = std::fs::read(tmp.path().join(REGISTRY_FILENAME)).unwrap();

    let reloaded = RegistryManager::load(tmp.path()).unwrap();
    assert_eq!(reloaded.registry().len(), 2);
    assert_eq!(
        reloaded.registry().default_binary_id,
        manager.registry().default_binary_id
    );

    // Re-saving an unchanged registry reproduces the same bytes
    reloaded.save().unwrap();
    let second = std::fs::read(tmp.path().join(REGISTRY_FILENAME)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn add_writes_version_json_next_to_the_binary() {
    let tmp = tempfile::tempdir().unwrap();
    let mut manager = RegistryManager::load(tmp.path()).unwrap();
    let e = entry("b100", Variant::LinuxX64);
    let dir = tmp.path().join(e.id.to_string());
    manager.add(e).unwrap();

    let version: BinaryEntry =
        serde_json::from_str(&std::fs::read_to_string(dir.join(VERSION_FILENAME)).unwrap())
            .unwrap();
    assert_eq!(version.version, "b100");
}

#[test]
fn remove_persists_promotion() {
    let tmp = tempfile::tempdir().unwrap();
    let mut manager = RegistryManager::load(tmp.path()).unwrap();
    let a = entry("b100", Variant::LinuxX64);
    let b = entry("b101", Variant::LinuxX64);
    let (a_id, b_id) = (a.id, b.id);
    manager.add(a).unwrap();
    manager.add(b).unwrap();

    manager.remove(a_id).unwrap();

    let reloaded = RegistryManager::load(tmp.path()).unwrap();
    assert_eq!(reloaded.registry().default_binary_id, Some(b_id));
}

#[test]
fn server_path_uses_discovered_executables() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = RegistryManager::load(tmp.path()).unwrap();

    let mut e = entry("b100", Variant::LinuxX64);
    e.executables = vec!["llama-bench".to_string(), "llama-server".to_string()];
    let expected = tmp.path().join(e.id.to_string()).join("llama-server");
    assert_eq!(manager.server_path(&e), Some(expected));

    e.executables = vec!["llama-bench".to_string()];
    assert!(manager.server_path(&e).is_none());
}
