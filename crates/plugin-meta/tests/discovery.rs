use std::fs;
use std::path::Path;

use plugin_meta::{
    find_plugin_by_id, find_plugins, JsonObject, LocaleChain, ManifestLoader, MetaDataOption,
    PluginLoader, PluginMetaData, StaticPlugin,
};
use serde_json::json;
use tempfile::TempDir;

fn write_manifest(dir: &Path, name: &str, value: serde_json::Value) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

fn descriptor(id: &str, name: &str) -> serde_json::Value {
    json!({ "KPlugin": { "Id": id, "Name": name } })
}

fn object(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

fn ids(plugins: &[PluginMetaData]) -> Vec<String> {
    plugins.iter().map(PluginMetaData::plugin_id).collect()
}

struct Fixture {
    _app: TempDir,
    _lib: TempDir,
    loader: ManifestLoader,
}

/// Two-tier search path: the application dir and one system library path,
/// each with a `viewers` namespace directory.
fn fixture() -> Fixture {
    let app = TempDir::new().unwrap();
    let lib = TempDir::new().unwrap();

    write_manifest(
        &app.path().join("viewers"),
        "appview.json",
        descriptor("appview", "App Viewer"),
    );
    write_manifest(
        &app.path().join("viewers"),
        "shared.json",
        descriptor("shared", "Shared (app copy)"),
    );
    write_manifest(
        &lib.path().join("viewers"),
        "libview.json",
        descriptor("libview", "Lib Viewer"),
    );
    write_manifest(
        &lib.path().join("viewers"),
        "shared.json",
        descriptor("shared", "Shared (lib copy)"),
    );

    let mut loader = ManifestLoader::new(app.path());
    loader.add_library_path(lib.path());
    Fixture {
        loader,
        _app: app,
        _lib: lib,
    }
}

#[test]
fn test_first_occurrence_wins_across_search_path() {
    let fx = fixture();
    let plugins = find_plugins(
        &fx.loader,
        "viewers",
        MetaDataOption::DoNotAllowEmptyMetaData,
        None,
    );
    assert_eq!(ids(&plugins), ["appview", "shared", "libview"]);

    // The application-dir copy shadowed the library one.
    let shared = plugins.iter().find(|p| p.plugin_id() == "shared").unwrap();
    assert_eq!(
        shared.name_with_locale(&LocaleChain::default()),
        "Shared (app copy)"
    );
}

#[test]
fn test_static_plugins_come_first() {
    let mut fx = fixture();
    fx.loader.register_static_plugin(
        "viewers",
        StaticPlugin::new("builtin", object(descriptor("builtin", "Built-in"))),
    );
    let plugins = find_plugins(
        &fx.loader,
        "viewers",
        MetaDataOption::DoNotAllowEmptyMetaData,
        None,
    );
    assert_eq!(ids(&plugins), ["builtin", "appview", "shared", "libview"]);
    assert!(plugins[0].is_static_plugin());
}

#[test]
fn test_filter_narrows_results_without_claiming_ids() {
    let fx = fixture();
    let only_lib = |md: &PluginMetaData| md.plugin_id() == "libview";
    let plugins = find_plugins(
        &fx.loader,
        "viewers",
        MetaDataOption::DoNotAllowEmptyMetaData,
        Some(&only_lib),
    );
    assert_eq!(ids(&plugins), ["libview"]);

    // A rejected first occurrence must not suppress a later acceptable one:
    // filter out the app copy of "shared" and expect the lib copy instead.
    let not_app_shared = |md: &PluginMetaData| {
        !(md.plugin_id() == "shared"
            && md.name_with_locale(&LocaleChain::default()) == "Shared (app copy)")
    };
    let plugins = find_plugins(
        &fx.loader,
        "viewers",
        MetaDataOption::DoNotAllowEmptyMetaData,
        Some(&not_app_shared),
    );
    let shared = plugins.iter().find(|p| p.plugin_id() == "shared").unwrap();
    assert_eq!(
        shared.name_with_locale(&LocaleChain::default()),
        "Shared (lib copy)"
    );
}

#[test]
fn test_invalid_manifests_are_skipped() {
    let fx = fixture();
    let dir = fx.loader.application_dir().join("viewers");
    fs::write(dir.join("broken.json"), "{ not json").unwrap();
    fs::write(dir.join("noise.txt"), "ignored, wrong extension").unwrap();
    // Parses, but the empty descriptor is rejected by the default option.
    write_manifest(&dir, "empty.json", json!({}));

    let plugins = find_plugins(
        &fx.loader,
        "viewers",
        MetaDataOption::DoNotAllowEmptyMetaData,
        None,
    );
    assert_eq!(ids(&plugins), ["appview", "shared", "libview"]);
}

#[test]
fn test_empty_metadata_accepted_when_allowed() {
    let fx = fixture();
    let dir = fx.loader.application_dir().join("viewers");
    write_manifest(&dir, "bare.json", json!({}));

    let plugins = find_plugins(
        &fx.loader,
        "viewers",
        MetaDataOption::AllowEmptyMetaData,
        None,
    );
    // Id falls back to the basename.
    assert!(ids(&plugins).contains(&"bare".to_string()));
}

#[test]
fn test_absolute_directory_scans_only_that_directory() {
    let fx = fixture();
    let lib_viewers = fx.loader.library_paths()[0].join("viewers");
    let plugins = find_plugins(
        &fx.loader,
        lib_viewers.to_str().unwrap(),
        MetaDataOption::DoNotAllowEmptyMetaData,
        None,
    );
    assert_eq!(ids(&plugins), ["libview", "shared"]);
}

#[test]
fn test_find_plugin_by_id_prefers_application_dir() {
    let fx = fixture();
    let md = find_plugin_by_id(&fx.loader, "viewers", "shared");
    assert!(md.is_valid());
    assert_eq!(
        md.name_with_locale(&LocaleChain::default()),
        "Shared (app copy)"
    );

    let md = find_plugin_by_id(&fx.loader, "viewers", "libview");
    assert!(md.is_valid());

    let md = find_plugin_by_id(&fx.loader, "viewers", "no-such-plugin");
    assert!(!md.is_valid());
}

#[test]
fn test_find_plugin_by_id_requires_matching_descriptor_id() {
    let fx = fixture();
    // File named after the id but declaring a different one inside.
    write_manifest(
        &fx.loader.application_dir().join("viewers"),
        "mismatch.json",
        descriptor("something-else", "Mismatch"),
    );
    let md = find_plugin_by_id(&fx.loader, "viewers", "mismatch");
    assert!(!md.is_valid());
}

#[test]
fn test_find_plugin_by_id_falls_back_to_static_registry() {
    let mut fx = fixture();
    fx.loader.register_static_plugin(
        "viewers",
        StaticPlugin::new("builtin", object(descriptor("builtin", "Built-in"))),
    );
    let md = find_plugin_by_id(&fx.loader, "viewers", "builtin");
    assert!(md.is_valid());
    assert!(md.is_static_plugin());
}

#[test]
fn test_json_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plugin.json");
    let value = descriptor("roundtrip", "Round Trip");
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    let md = PluginMetaData::from_json_file(&path);
    assert!(md.is_valid());
    assert_eq!(md.plugin_id(), "roundtrip");
    assert_eq!(md.raw_data(), &object(value));

    let missing = PluginMetaData::from_json_file(dir.path().join("missing.json"));
    assert!(!missing.is_valid());
    assert!(PluginMetaData::try_from_json_file(dir.path().join("missing.json")).is_err());
}
