use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Local};
use colored::Colorize;
use serde_json::{json, Value};
use stash_cache::{BackendKind, Cache, CacheError, HostProbe, StashConfig};
use stash_merge::FragmentFolder;
use stash_store::DiskStore;
use stash_types::{Fragment, Key, Map};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.root)?;
    let cache = Cache::from_config(&config, &HostProbe)?;
    let format = cli.format;
    match cli.command {
        Command::Keys => cmd_keys(&cache, &format),
        Command::Size => cmd_size(&cache, &format),
        Command::Get(args) => cmd_get(&cache, args, &format),
        Command::Set(args) => cmd_set(&cache, args),
        Command::Clear(args) => cmd_clear(&cache, args),
        Command::Info(args) => cmd_info(&cache, &config, args, &format),
        Command::Merge(args) => cmd_merge(&cache, args),
        Command::Path(args) => cmd_path(&config, args, &format),
    }
}

/// Configuration file (if any), then `STASH_*` variables, then `--root`.
fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> anyhow::Result<StashConfig> {
    let config = match path {
        Some(path) => StashConfig::load(path)?,
        None => StashConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(root) = root {
        config.root = Some(root);
    }
    debug!(backend = %config.backend, root = ?config.root, "configuration resolved");
    Ok(config)
}

fn cmd_keys(cache: &Cache, format: &OutputFormat) -> anyhow::Result<()> {
    let keys = cache.keys()?;
    match format {
        OutputFormat::Json => println!("{}", json!(keys)),
        OutputFormat::Text if keys.is_empty() => println!("No cached keys."),
        OutputFormat::Text => {
            for key in &keys {
                println!("{key}");
            }
        }
    }
    Ok(())
}

fn cmd_size(cache: &Cache, format: &OutputFormat) -> anyhow::Result<()> {
    let size = cache.size()?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "size": size })),
        OutputFormat::Text => println!("{} cached entries", size.to_string().bold()),
    }
    Ok(())
}

fn cmd_get(cache: &Cache, args: GetArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let value = cache.fetch(args.key)?;
    let text = match format {
        OutputFormat::Json => serde_json::to_string(&value)?,
        OutputFormat::Text => serde_json::to_string_pretty(&value)?,
    };
    println!("{text}");
    Ok(())
}

fn cmd_set(cache: &Cache, args: SetArgs) -> anyhow::Result<()> {
    let value: Value = serde_json::from_str(&args.value)
        .with_context(|| format!("value for {:?} is not valid JSON", args.key))?;
    let key = Key::new(args.key);
    cache.store().set(&key, &value)?;
    println!("{} Cached {}", "✓".green(), key.as_str().yellow());
    Ok(())
}

fn cmd_clear(cache: &Cache, args: ClearArgs) -> anyhow::Result<()> {
    match args.key {
        Some(key) => {
            let key = Key::new(key);
            // Expired or unreadable records are still stored and still cleared.
            let stored = cache.modified(&key)?.is_some();
            cache.clear_key(&key)?;
            if stored {
                println!("{} Cleared {}", "✓".green(), key.as_str().yellow());
            } else {
                println!("{} is not cached", key.as_str().yellow());
            }
        }
        None => {
            let size = cache.size()?;
            cache.clear_all()?;
            println!("{} Cleared {} entries", "✓".green(), size.to_string().bold());
        }
    }
    Ok(())
}

fn cmd_info(
    cache: &Cache,
    config: &StashConfig,
    args: InfoArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let key = Key::new(args.key);
    let modified: DateTime<Local> = cache
        .modified(&key)?
        .ok_or_else(|| CacheError::KeyNotCached(key.clone()))?
        .into();
    let fresh = cache.contains(&key)?;
    let file = backing_file(config, &key)?;
    let file = file.map(|file| file.display().to_string());

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "key": key,
                "modified": modified.to_rfc3339(),
                "fresh": fresh,
                "file": file,
            })
        ),
        OutputFormat::Text => {
            println!("Key: {}", key.as_str().yellow().bold());
            println!("  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S %Z"));
            let state = if fresh { "fresh".green() } else { "expired".red() };
            println!("  State: {state}");
            match &file {
                Some(file) => println!("  File: {}", file.cyan()),
                None => println!("  File: {}", "(in memory)".dimmed()),
            }
        }
    }
    Ok(())
}

fn cmd_merge(cache: &Cache, args: MergeArgs) -> anyhow::Result<()> {
    let mut folder = FragmentFolder::new();
    for path in &args.files {
        folder.extend(read_fragments(path)?);
    }
    let fragments = folder.folded();
    let roots = folder.len();
    let merged = Value::Object(folder.finish());

    let key = Key::new(args.key);
    cache.store().set(&key, &merged)?;
    println!(
        "{} Merged {} fragments ({} roots) into {}",
        "✓".green(),
        fragments.to_string().bold(),
        roots,
        key.as_str().yellow()
    );
    Ok(())
}

fn cmd_path(config: &StashConfig, args: PathArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let key = Key::new(args.key);
    let Some(file) = backing_file(config, &key)? else {
        bail!("the {} backend keeps no files", config.backend);
    };
    match format {
        OutputFormat::Json => {
            println!("{}", json!({ "key": key, "file": file.display().to_string() }))
        }
        OutputFormat::Text => println!("{}", file.display()),
    }
    Ok(())
}

fn backing_file(config: &StashConfig, key: &Key) -> anyhow::Result<Option<PathBuf>> {
    match config.backend {
        BackendKind::Disk => {
            let store = DiskStore::open(config.resolve_root(&HostProbe))?;
            Ok(Some(store.cache_file(key)?))
        }
        BackendKind::Memory => Ok(None),
    }
}

/// Read a JSON file holding `{ root: { sub-key: attributes }, ... }`. Each
/// root becomes one fragment.
fn read_fragments(path: &Path) -> anyhow::Result<Vec<Fragment>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let Value::Object(roots) = value else {
        bail!("{}: expected an object of fragments", path.display());
    };

    roots
        .into_iter()
        .map(|(root, subtree)| {
            let mut single = Map::new();
            single.insert(root, subtree);
            Fragment::try_from(Value::Object(single))
                .with_context(|| format!("invalid fragment in {}", path.display()))
        })
        .collect()
}
