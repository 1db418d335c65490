use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use markform_config::{Config, DialectPreference};
use markform_engine::{
    Dialect, Form, Issue, Patch, PatchOutcome, Role, RoleFilter, SerializeOptions, Severity,
    apply_patches, export_values, io, list_issues, serialize, validate,
};
use relative_path::RelativePathBuf;
use std::path::{Path, PathBuf};
use std::process;

/// Inspect, fill in and format markform documents
#[derive(Parser, Debug)]
#[command(name = "markform")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a summary of the form and its outstanding issues
    Inspect {
        file: PathBuf,
    },

    /// Report structural and value errors; exits 1 when there are any
    Validate {
        file: PathBuf,
    },

    /// List outstanding issues in document order
    Issues {
        file: PathBuf,

        /// Only report issues for these roles (repeatable)
        #[arg(short, long = "role", value_parser = parse_role)]
        roles: Vec<Role>,
    },

    /// Apply a JSON array of patches to a form
    Apply {
        file: PathBuf,

        /// JSON file holding the patches
        patches: PathBuf,

        /// Rewrite the file instead of printing the result
        #[arg(short, long)]
        write: bool,
    },

    /// Rewrite a form in canonical form
    Fmt {
        file: PathBuf,

        /// Directive syntax to write
        #[arg(short, long, value_enum)]
        dialect: Option<DialectArg>,

        /// Rewrite the file instead of printing the result
        #[arg(short, long)]
        write: bool,
    },

    /// Print field values
    Export {
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },

    /// List form documents under the forms directory
    List {
        /// Forms directory; defaults to `forms_path` from the config file
        forms_path: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DialectArg {
    Tags,
    Comments,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Tags => Dialect::Tags,
            DialectArg::Comments => Dialect::Comments,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportFormat {
    Json,
    Yaml,
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::parse(s).ok_or_else(|| format!("unknown role `{s}` (expected `agent` or `user`)"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config();

    match cli.command {
        Command::Inspect { file } => inspect(&file, config.as_ref()),
        Command::Validate { file } => {
            let form = open(&file)?;
            let errors = validate(&form);
            if errors.is_empty() {
                println!("{}: ok", file.display());
                return Ok(());
            }
            for error in &errors {
                println!("{error}");
            }
            eprintln!("{}: {} error(s)", file.display(), errors.len());
            process::exit(1);
        }
        Command::Issues { file, roles } => {
            let form = open(&file)?;
            let filter = role_filter(roles, config.as_ref());
            for issue in list_issues(&form, &filter) {
                print_issue(&issue);
            }
            Ok(())
        }
        Command::Apply {
            file,
            patches,
            write,
        } => apply(&file, &patches, write, config.as_ref()),
        Command::Fmt {
            file,
            dialect,
            write,
        } => {
            let form = open(&file)?;
            let options = serialize_options(dialect.map(Dialect::from), config.as_ref());
            emit(&file, &form, options, write)
        }
        Command::Export { file, format } => {
            let form = open(&file)?;
            let values = export_values(&form);
            let text = match format {
                ExportFormat::Json => serde_json::to_string_pretty(&values)? + "\n",
                ExportFormat::Yaml => serde_yaml::to_string(&values)?,
            };
            print!("{text}");
            Ok(())
        }
        Command::List { forms_path } => list(forms_path, config.as_ref()),
    }
}

/// A missing config file is normal; a broken one is reported and ignored.
fn load_config() -> Option<Config> {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("ignoring config: {e}");
            None
        }
    }
}

/// Splits a path into a root directory and a relative path for the engine's I/O helpers.
fn locate(file: &Path) -> Result<(PathBuf, RelativePathBuf)> {
    let name = file
        .file_name()
        .with_context(|| format!("not a file path: {}", file.display()))?;
    let root = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let relative = RelativePathBuf::from_path(name)
        .with_context(|| format!("not a file path: {}", file.display()))?;
    Ok((root, relative))
}

fn open(file: &Path) -> Result<Form> {
    let (root, relative) = locate(file)?;
    Ok(io::load_form(&relative, &root)?)
}

fn emit(file: &Path, form: &Form, options: SerializeOptions, write: bool) -> Result<()> {
    if write {
        let (root, relative) = locate(file)?;
        io::save_form(&relative, &root, form, options)?;
        log::info!("wrote {}", file.display());
    } else {
        print!("{}", serialize(form, options));
    }
    Ok(())
}

fn serialize_options(dialect: Option<Dialect>, config: Option<&Config>) -> SerializeOptions {
    let dialect = dialect.or_else(|| match config.map(|c| c.dialect) {
        Some(DialectPreference::Tags) => Some(Dialect::Tags),
        Some(DialectPreference::Comments) => Some(Dialect::Comments),
        Some(DialectPreference::Keep) | None => None,
    });
    SerializeOptions { dialect }
}

fn role_filter(roles: Vec<Role>, config: Option<&Config>) -> RoleFilter {
    if !roles.is_empty() {
        return RoleFilter::Roles(roles);
    }
    let configured: Vec<Role> = config
        .map(|c| {
            c.roles
                .iter()
                .filter_map(|r| Role::parse(r))
                .collect()
        })
        .unwrap_or_default();
    if configured.is_empty() {
        RoleFilter::All
    } else {
        RoleFilter::Roles(configured)
    }
}

fn print_issue(issue: &Issue) {
    let severity = match issue.severity {
        Severity::Required => "required",
        Severity::Recommended => "recommended",
    };
    let mut line = format!("{} [{severity}, {}] {}", issue.scope, issue.role, issue.message);
    if !issue.blocked_by.is_empty() {
        line.push_str(&format!(" (blocked by {})", issue.blocked_by.join(", ")));
    }
    println!("{line}");
}

fn inspect(file: &Path, config: Option<&Config>) -> Result<()> {
    let form = open(file)?;
    let progress = form.progress();

    match &form.title {
        Some(title) => println!("{title} ({})", form.id),
        None => println!("{}", form.id),
    }
    println!("dialect: {}", form.dialect);
    println!(
        "fields: {} total, {} answered, {} empty, {} skipped, {} aborted",
        progress.total, progress.answered, progress.empty, progress.skipped, progress.aborted
    );
    println!("required remaining: {}", progress.required_remaining);
    println!("notes: {}", form.notes.len());

    let errors = validate(&form);
    if !errors.is_empty() {
        println!();
        println!("errors:");
        for error in &errors {
            println!("  {error}");
        }
    }

    let issues = list_issues(&form, &role_filter(Vec::new(), config));
    if issues.is_empty() {
        println!();
        println!("complete");
    } else {
        println!();
        println!("issues:");
        for issue in &issues {
            print!("  ");
            print_issue(issue);
        }
    }
    Ok(())
}

fn apply(file: &Path, patches: &Path, write: bool, config: Option<&Config>) -> Result<()> {
    let form = open(file)?;
    let json = std::fs::read_to_string(patches)
        .with_context(|| format!("reading patches from {}", patches.display()))?;
    let patches: Vec<Patch> = serde_json::from_str(&json)
        .with_context(|| format!("parsing patches from {}", patches.display()))?;

    let result = apply_patches(&form, &patches);
    let mut rejected = 0;
    for (index, (patch, outcome)) in patches.iter().zip(&result.outcomes).enumerate() {
        if let PatchOutcome::Rejected(reason) = outcome {
            rejected += 1;
            eprintln!("patch {index} ({}): rejected: {reason}", patch.op());
        }
    }
    log::info!(
        "applied {} of {} patches",
        patches.len() - rejected,
        patches.len()
    );

    let options = serialize_options(None, config);
    emit(file, &result.form, options, write)?;
    if rejected > 0 {
        process::exit(1);
    }
    Ok(())
}

fn list(forms_path: Option<PathBuf>, config: Option<&Config>) -> Result<()> {
    let from_config = forms_path.is_none();
    let forms_path = match forms_path.or_else(|| config.map(|c| c.forms_path.clone())) {
        Some(path) => path,
        None => bail!(
            "no forms directory given and no config file found at {}",
            Config::config_path().display()
        ),
    };

    let files = io::scan_form_files(&forms_path).map_err(|e| {
        let source = if from_config {
            format!(" from config file '{}'", Config::config_path().display())
        } else {
            String::new()
        };
        anyhow::anyhow!(
            "forms path '{}'{source} is invalid: {e}",
            forms_path.display()
        )
    })?;

    for path in files {
        let display = path.strip_prefix(&forms_path).unwrap_or(&path).display();
        match open(&path) {
            Ok(form) => {
                let progress = form.progress();
                println!(
                    "{display}\t{}\t{}/{} answered",
                    form.id, progress.answered, progress.total
                );
            }
            Err(e) => log::warn!("skipping {display}: {e}"),
        }
    }
    Ok(())
}
