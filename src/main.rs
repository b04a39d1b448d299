mod cli;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use cli::config::CLIConfig;
use noteweave::TagSort;
use std::path::PathBuf;
use termcolor::ColorChoice;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Argument Parsing
// ============================================================================

#[derive(Parser)]
#[command(name = "noteweave")]
#[command(about = "Wiki links, embeds, tags and search for a directory of Markdown notes")]
#[command(version)]
struct Cli {
    /// Notes directory (overrides $NOTEWEAVE_DIR)
    #[arg(long, global = true)]
    notes_dir: Option<PathBuf>,

    /// When to use colors (auto, always, never)
    #[arg(long, global = true, default_value = "auto", value_name = "WHEN")]
    color: ColorChoice,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Resolve notes directory from CLI arg, env var, CLI config, or default
fn resolve_notes_dir(cli_arg: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = cli_arg {
        return Ok(dir);
    }

    if let Ok(env_dir) = std::env::var("NOTEWEAVE_DIR") {
        return Ok(PathBuf::from(env_dir));
    }

    if let Some(config) = CLIConfig::resolve_and_load()? {
        return Ok(config.notes_dir);
    }

    // Default: $XDG_DATA_HOME/noteweave or ~/.local/share/noteweave
    let data_home = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data)
    } else {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        PathBuf::from(home).join(".local/share")
    };

    Ok(data_home.join("noteweave"))
}

/// Log to stderr; RUST_LOG overrides the -v level
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Frequency,
    Alphabetical,
}

impl From<SortArg> for TagSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Frequency => TagSort::Frequency,
            SortArg::Alphabetical => TagSort::Alphabetical,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search notes (supports tag:, from:, to:, regex: and case:)
    Search {
        /// Search query
        query: Vec<String>,
    },

    /// Tag management commands
    #[command(subcommand)]
    Tags(TagCommands),

    /// Note management commands
    #[command(subcommand)]
    Note(NoteCommands),

    /// List links to notes that do not exist yet
    Placeholders {
        /// Only show placeholders in this note
        #[arg(long)]
        file: Option<String>,

        /// Create the note a placeholder link names
        #[arg(long, value_name = "LINK")]
        create: Option<String>,
    },

    /// Embedded content commands
    #[command(subcommand)]
    Embed(EmbedCommands),

    /// Generate the notes of a bundle workflow
    Bundle {
        /// Bundle name in the bundle directory
        workflow: String,

        /// Bundle variable (can be specified multiple times)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Template commands
    #[command(subcommand)]
    Template(TemplateCommands),

    /// Check for issues in the note collection
    Doctor,
}

#[derive(Subcommand)]
enum TagCommands {
    /// List all tags with their note counts
    List {
        #[arg(long, value_enum, default_value = "frequency")]
        sort: SortArg,
    },

    /// List notes carrying all of the given tags
    Notes {
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Rename a tag across all notes
    Rename {
        old: String,
        new: String,

        /// Merge without asking when the new tag already exists
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Fold one tag into another
    Merge { into: String, from: String },

    /// Remove a tag from every note
    Delete { tag: String },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Show links leaving a note
    Links {
        /// Note path or link text
        note: String,
    },

    /// Show links pointing at a note
    Backlinks {
        /// Note path or link text
        note: String,
    },

    /// Rename a note and update links to it
    Rename { old: String, new: String },

    /// Create a new note
    New {
        /// Note title
        title: String,

        /// Template to use
        #[arg(long)]
        template: Option<String>,
    },
}

#[derive(Subcommand)]
enum EmbedCommands {
    /// Print a note, or one section of it, as an embed would show it
    Show {
        note: String,

        #[arg(long)]
        section: Option<String>,
    },

    /// List the headings of a note
    Sections { note: String },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List available templates
    List,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let cli_args = Cli::parse();
    init_tracing(cli_args.verbose);

    let notes_dir = resolve_notes_dir(cli_args.notes_dir)?;
    let color = cli_args.color;

    match cli_args.command {
        Commands::Search { query } => {
            cli::commands::search(&notes_dir, &query.join(" "), color)?;
        }
        Commands::Tags(tag_cmd) => match tag_cmd {
            TagCommands::List { sort } => {
                cli::commands::tags_list(&notes_dir, sort.into(), color)?;
            }
            TagCommands::Notes { tags } => {
                cli::commands::tags_notes(&notes_dir, &tags, color)?;
            }
            TagCommands::Rename { old, new, yes } => {
                cli::commands::tags_rename(&notes_dir, &old, &new, yes, color)?;
            }
            TagCommands::Merge { into, from } => {
                cli::commands::tags_merge(&notes_dir, &into, &from, color)?;
            }
            TagCommands::Delete { tag } => {
                cli::commands::tags_delete(&notes_dir, &tag, color)?;
            }
        },
        Commands::Note(note_cmd) => match note_cmd {
            NoteCommands::Links { note } => {
                cli::commands::note_links(&notes_dir, &note, color)?;
            }
            NoteCommands::Backlinks { note } => {
                cli::commands::note_backlinks(&notes_dir, &note, color)?;
            }
            NoteCommands::Rename { old, new } => {
                cli::commands::note_rename(&notes_dir, &old, &new, color)?;
            }
            NoteCommands::New { title, template } => {
                cli::commands::note_new(&notes_dir, &title, template.as_deref(), color)?;
            }
        },
        Commands::Placeholders { file, create } => {
            cli::commands::placeholders(&notes_dir, file.as_deref(), create.as_deref(), color)?;
        }
        Commands::Embed(embed_cmd) => match embed_cmd {
            EmbedCommands::Show { note, section } => {
                cli::commands::embed_show(&notes_dir, &note, section.as_deref())?;
            }
            EmbedCommands::Sections { note } => {
                cli::commands::embed_sections(&notes_dir, &note, color)?;
            }
        },
        Commands::Bundle { workflow, vars } => {
            cli::commands::bundle(&notes_dir, &workflow, &vars, color)?;
        }
        Commands::Template(TemplateCommands::List) => {
            cli::commands::template_list(&notes_dir, color)?;
        }
        Commands::Doctor => {
            cli::commands::doctor(&notes_dir, color)?;
        }
    }

    Ok(())
}
