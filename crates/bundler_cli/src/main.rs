//! CLI entry point (§10.5): resolves `--root`, wires up the filesystem
//! resolver/loader/analyzer, drives `generate_manifest` -> `bundle`, and
//! writes the resulting bundle contents plus an optional manifest-out file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use bundle_analyzer::StdAnalyzer;
use bundle_url::{FsLoader, FsUrlResolver, ResolvedUrl};
use bundler_core::{Bundler, BundlerJSONOptions, BundlerOptions};
use logger::{Logger, StdioLogger};

#[derive(Parser, Debug)]
#[command(
    name = "bundler",
    version,
    about = "Bundles HTML and JS entrypoints into a minimal, deduplicated set of output files"
)]
struct Cli {
    /// Entrypoint file(s) to bundle, given as paths relative to --root.
    #[arg(value_name = "IN_FILE", required = true)]
    in_file: Vec<String>,

    /// Write the single resulting bundle here. Errors if bundling produced more than one bundle.
    #[arg(long, value_name = "PATH")]
    out_file: Option<PathBuf>,

    /// Write every resulting bundle under this directory, at a path matching its bundle URL.
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Write the bundle manifest as JSON (bundle URL -> constituent files, plus "_missing").
    #[arg(long, value_name = "PATH")]
    manifest_out: Option<PathBuf>,

    /// Force this file into its own bundle and merge every bundle sharing a dependency with it into it.
    #[arg(long, value_name = "PATH")]
    shell: Option<String>,

    /// Exclude a file, or everything under a folder, from bundling. Repeatable.
    #[arg(long = "exclude", value_name = "PATH")]
    excludes: Vec<String>,

    /// Redirect an import prefix to a different path, given as "prefix|path". Repeatable.
    #[arg(long = "redirect", value_name = "PREFIX|PATH")]
    redirects: Vec<String>,

    /// Inline imported scripts into the HTML documents that reference them.
    #[arg(long)]
    inline_scripts: bool,

    /// Inline imported stylesheets into the HTML documents that reference them.
    #[arg(long)]
    inline_css: bool,

    /// Also rewrite relative URLs found inside <template> contents.
    #[arg(long)]
    rewrite_urls_in_templates: bool,

    /// Strip non-license HTML/JS comments, deduplicating license comments to the document head.
    #[arg(long)]
    strip_comments: bool,

    /// Reserved for source map emission; accepted for config-shape parity, not yet acted on.
    #[arg(long)]
    sourcemaps: bool,

    /// Project root every IN_FILE/--exclude/--shell path is resolved against.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let start = std::time::Instant::now();

    let root = std::fs::canonicalize(&cli.root)
        .with_context(|| format!("resolving --root {}", cli.root.display()))?;

    // --redirect isn't wired into FsUrlResolver's path algebra yet; validate
    // the syntax so a typo is caught early, but the prefix rewrite itself is
    // a no-op until a resolver that consults it exists.
    for r in &cli.redirects {
        r.split_once('|')
            .with_context(|| format!("--redirect {r:?} must be of the form prefix|path"))?;
    }

    let resolver = FsUrlResolver;
    let loader = FsLoader::new(&root);
    let analyzer = StdAnalyzer;

    let json_options = BundlerJSONOptions {
        excludes: cli.excludes.clone(),
        inline_scripts: cli.inline_scripts,
        inline_css: cli.inline_css,
        rewrite_urls_in_templates: cli.rewrite_urls_in_templates,
        strip_comments: cli.strip_comments,
        sourcemaps: cli.sourcemaps,
    };
    let options = BundlerOptions::try_from(json_options)?;
    let bundler = Bundler::new(&resolver, &loader, &analyzer, options);
    let logger = StdioLogger::new();

    let entrypoints: Vec<ResolvedUrl> = cli.in_file.iter().map(ResolvedUrl::new).collect();

    let manifest = match &cli.shell {
        Some(shell) => {
            let shell_url = ResolvedUrl::new(shell.as_str());
            bundler.generate_manifest_with_shell(&entrypoints, &shell_url, &logger)?
        }
        None => bundler.generate_manifest(&entrypoints, &logger)?,
    };

    let output = bundler.bundle(&manifest, &logger)?;

    if let Some(dir) = &cli.out_dir {
        for (bundle_url, doc) in &output.documents {
            write_under(dir, bundle_url.as_str(), &doc.content)?;
        }
    } else if let Some(file) = &cli.out_file {
        if output.documents.len() != 1 {
            anyhow::bail!(
                "--out-file requires exactly one output bundle, got {}; use --out-dir instead",
                output.documents.len()
            );
        }
        let content = &output.documents.values().next().unwrap().content;
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(file, content).with_context(|| format!("writing {}", file.display()))?;
    }

    if let Some(manifest_out) = &cli.manifest_out {
        write_manifest(&output.manifest, manifest_out)?;
    }

    (&logger).log(format!(
        "bundled {} entrypoint(s) into {} bundle(s) in {}ms",
        entrypoints.len(),
        output.documents.len(),
        start.elapsed().as_millis()
    ));

    Ok(())
}

fn write_under(dir: &std::path::Path, bundle_url: &str, content: &str) -> Result<()> {
    let path = dir.join(bundle_url);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))
}

/// Serializes `{ [bundleUrl]: [file1, file2, ...], "_missing"?: [url, ...] }` (§6).
fn write_manifest(
    manifest: &bundle_manifest::BundleManifest,
    path: &std::path::Path,
) -> Result<()> {
    let mut obj = serde_json::Map::new();
    let mut missing: Vec<String> = Vec::new();

    let mut bundle_urls: Vec<&ResolvedUrl> = manifest.bundles.keys().collect();
    bundle_urls.sort();
    for bundle_url in bundle_urls {
        let bundle = &manifest.bundles[bundle_url];
        let mut files: Vec<String> = bundle.files.iter().map(|f| f.as_str().to_string()).collect();
        files.sort();
        obj.insert(bundle_url.as_str().to_string(), serde_json::Value::from(files));
        missing.extend(bundle.missing_imports.iter().map(|m| m.as_str().to_string()));
    }

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        obj.insert("_missing".to_string(), serde_json::Value::from(missing));
    }

    let rendered = serde_json::to_string_pretty(&serde_json::Value::Object(obj))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))
}
