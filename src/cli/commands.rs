//! Command implementations
//!
//! All CLI command logic is implemented here as functions that are called
//! from the main entry point.

use super::colors;
use super::utils::{confirm, parse_vars, pluralize};
use anyhow::Result;
use noteweave::tags::{format_tag_for_display, format_tag_for_storage};
use noteweave::{FileFailure, NoteWeave, RealStorage, TagSort};
use std::io::Write;
use std::path::{Path, PathBuf};
use termcolor::{ColorChoice, StandardStream, WriteColor};

/// Display form of a tag as the user typed it
fn display_tag(tag: &str) -> String {
    format_tag_for_display(&format_tag_for_storage(tag))
}

fn open(notes_dir: &Path) -> Result<NoteWeave> {
    if !notes_dir.is_dir() {
        anyhow::bail!("Notes directory not found: {}", notes_dir.display());
    }
    let storage = Box::new(RealStorage::new(notes_dir.to_path_buf()));
    Ok(NoteWeave::with_defaults(storage))
}

/// Find a note by path or link text, or fail
fn find_note(notes: &NoteWeave, name: &str) -> Result<PathBuf> {
    notes
        .find_note(name)?
        .ok_or_else(|| anyhow::anyhow!("Note not found: {}", name))
}

fn print_failures(stdout: &mut StandardStream, failures: &[FileFailure]) -> Result<()> {
    if failures.is_empty() {
        return Ok(());
    }

    stdout.set_color(&colors::error())?;
    writeln!(
        stdout,
        "Failed to update {} {}:",
        failures.len(),
        pluralize(failures.len(), "file", "files")
    )?;
    stdout.reset()?;
    for failure in failures {
        writeln!(stdout, "  {}: {}", failure.path.display(), failure.message)?;
    }
    Ok(())
}

// ============================================================================
// Search
// ============================================================================

pub fn search(notes_dir: &Path, query: &str, color: ColorChoice) -> Result<()> {
    let notes = open(notes_dir)?;
    let results = notes.search(query)?;

    if results.is_empty() {
        println!("No notes found matching: {}", query);
        return Ok(());
    }

    let mut stdout = colors::create_stdout(color);
    for result in &results {
        stdout.set_color(&colors::highlight())?;
        write!(stdout, "{}", result.title)?;
        stdout.set_color(&colors::dim())?;
        writeln!(stdout, "  {} ({:.2})", result.path.display(), result.score)?;
        stdout.reset()?;

        if !result.preview.is_empty() {
            writeln!(stdout, "  {}", result.preview)?;
        }
        if !result.tags.is_empty() {
            stdout.set_color(&colors::tag())?;
            let tags: Vec<String> = result.tags.iter().map(|t| format_tag_for_display(t)).collect();
            writeln!(stdout, "  {}", tags.join(" "))?;
            stdout.reset()?;
        }
        writeln!(stdout)?;
    }

    writeln!(
        stdout,
        "Found {} {}",
        results.len(),
        pluralize(results.len(), "match", "matches")
    )?;

    Ok(())
}

// ============================================================================
// Tags
// ============================================================================

pub fn tags_list(notes_dir: &Path, sort: TagSort, color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let tags = notes.list_tags(sort)?;

    if tags.is_empty() {
        println!("No tags found.");
        return Ok(());
    }

    let mut stdout = colors::create_stdout(color);
    for tag in &tags {
        stdout.set_color(&colors::tag())?;
        write!(stdout, "{}", format_tag_for_display(&tag.name))?;
        stdout.set_color(&colors::dim())?;
        writeln!(stdout, " ({})", tag.count)?;
        stdout.reset()?;
    }

    println!("\nTotal: {} {}", tags.len(), pluralize(tags.len(), "tag", "tags"));
    Ok(())
}

pub fn tags_notes(notes_dir: &Path, tags: &[String], color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let paths = notes.notes_with_tags(tags)?;

    if paths.is_empty() {
        println!("No notes found with tags: {}", tags.join(", "));
        return Ok(());
    }

    let mut stdout = colors::create_stdout(color);
    for path in &paths {
        writeln!(stdout, "{}", path.display())?;
    }
    stdout.set_color(&colors::dim())?;
    writeln!(stdout, "\nTotal: {} {}", paths.len(), pluralize(paths.len(), "note", "notes"))?;
    stdout.reset()?;
    Ok(())
}

pub fn tags_rename(notes_dir: &Path, old: &str, new: &str, yes: bool, color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let plan = notes.plan_tag_rename(old, new)?;

    if plan.notes.is_empty() {
        println!("No notes are tagged {}.", format_tag_for_display(&plan.old_tag));
        return Ok(());
    }

    if plan.target_exists && !yes {
        let prompt = format!(
            "{} already exists. Merge {} into it ({} {})?",
            format_tag_for_display(&plan.new_tag),
            format_tag_for_display(&plan.old_tag),
            plan.notes.len(),
            pluralize(plan.notes.len(), "note", "notes")
        );
        if !confirm(&prompt)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = notes.rename_tag(old, new)?;

    let mut stdout = colors::create_stdout(color);
    stdout.set_color(&colors::success())?;
    writeln!(
        stdout,
        "Renamed {} to {} in {} {}",
        format_tag_for_display(&plan.old_tag),
        format_tag_for_display(&plan.new_tag),
        report.notes_updated_count(),
        pluralize(report.notes_updated_count(), "note", "notes")
    )?;
    stdout.reset()?;
    print_failures(&mut stdout, &report.failures)
}

pub fn tags_merge(notes_dir: &Path, into: &str, from: &str, color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let report = notes.merge_tags(into, from)?;

    let mut stdout = colors::create_stdout(color);
    stdout.set_color(&colors::success())?;
    writeln!(
        stdout,
        "Merged {} into {} in {} {}",
        display_tag(from),
        display_tag(into),
        report.notes_updated_count(),
        pluralize(report.notes_updated_count(), "note", "notes")
    )?;
    stdout.reset()?;
    print_failures(&mut stdout, &report.failures)
}

pub fn tags_delete(notes_dir: &Path, tag: &str, color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let report = notes.delete_tag(tag)?;

    let mut stdout = colors::create_stdout(color);
    stdout.set_color(&colors::success())?;
    writeln!(
        stdout,
        "Removed {} from {} {}",
        display_tag(tag),
        report.notes_updated_count(),
        pluralize(report.notes_updated_count(), "note", "notes")
    )?;
    stdout.reset()?;
    print_failures(&mut stdout, &report.failures)
}

// ============================================================================
// Notes
// ============================================================================

pub fn note_links(notes_dir: &Path, name: &str, color: ColorChoice) -> Result<()> {
    let notes = open(notes_dir)?;
    let path = find_note(&notes, name)?;
    let links = notes.outgoing_links(&path)?;

    let mut stdout = colors::create_stdout(color);
    stdout.set_color(&colors::highlight())?;
    writeln!(stdout, "Links from {}:", path.display())?;
    stdout.reset()?;

    if links.is_empty() {
        writeln!(stdout, "  (none)")?;
        return Ok(());
    }

    for outgoing in &links {
        write!(stdout, "  [[{}]]", outgoing.link.link_text)?;
        match &outgoing.target {
            Some(target) => {
                stdout.set_color(&colors::dim())?;
                writeln!(stdout, " -> {}", target.display())?;
            }
            None => {
                stdout.set_color(&colors::warning())?;
                writeln!(stdout, " (placeholder)")?;
            }
        }
        stdout.reset()?;
    }
    Ok(())
}

pub fn note_backlinks(notes_dir: &Path, name: &str, color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let path = find_note(&notes, name)?;
    let backlinks = notes.backlinks(&path)?;

    let mut stdout = colors::create_stdout(color);
    stdout.set_color(&colors::highlight())?;
    writeln!(stdout, "Links to {}:", path.display())?;
    stdout.reset()?;

    if backlinks.is_empty() {
        writeln!(stdout, "  (none)")?;
        return Ok(());
    }

    for backlink in &backlinks {
        write!(stdout, "  {}", backlink.source_file.display())?;
        stdout.set_color(&colors::dim())?;
        writeln!(stdout, ":{}  [[{}]]", backlink.line + 1, backlink.link_text)?;
        stdout.reset()?;
    }
    Ok(())
}

pub fn note_rename(notes_dir: &Path, old: &str, new: &str, color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let old_path = find_note(&notes, old)?;
    let new_path = PathBuf::from(new);

    let report = notes.rename_note(&old_path, &new_path)?;

    let mut stdout = colors::create_stdout(color);
    stdout.set_color(&colors::success())?;
    writeln!(
        stdout,
        "Renamed {} to {}, updating {} {} in {} {}",
        old_path.display(),
        new_path.display(),
        report.links_updated,
        pluralize(report.links_updated, "link", "links"),
        report.files_updated,
        pluralize(report.files_updated, "file", "files")
    )?;
    stdout.reset()?;
    print_failures(&mut stdout, &report.failures)
}

pub fn note_new(notes_dir: &Path, title: &str, template: Option<&str>, color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let path = notes.create_note(title, template)?;

    let mut stdout = colors::create_stdout(color);
    stdout.set_color(&colors::success())?;
    // note path is relative, join with notes_dir for display
    writeln!(stdout, "Created note: {}", notes_dir.join(path).display())?;
    stdout.reset()?;
    Ok(())
}

// ============================================================================
// Placeholders and embeds
// ============================================================================

pub fn placeholders(
    notes_dir: &Path,
    file: Option<&str>,
    create: Option<&str>,
    color: ColorChoice,
) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let mut stdout = colors::create_stdout(color);

    if let Some(link_text) = create {
        let path = notes.create_note_from_placeholder(link_text)?;
        stdout.set_color(&colors::success())?;
        writeln!(stdout, "Created note: {}", notes_dir.join(path).display())?;
        stdout.reset()?;
        return Ok(());
    }

    if let Some(name) = file {
        let path = find_note(&notes, name)?;
        let found = notes.placeholders().get_placeholders_in_file(&path)?;
        if found.is_empty() {
            println!("No placeholders in {}.", path.display());
            return Ok(());
        }
        for occurrence in &found {
            stdout.set_color(&colors::warning())?;
            write!(stdout, "[[{}]]", occurrence.link_text)?;
            stdout.set_color(&colors::dim())?;
            writeln!(stdout, "  line {}", occurrence.source.line + 1)?;
            stdout.reset()?;
            writeln!(stdout, "  {}", occurrence.source.context)?;
        }
        return Ok(());
    }

    let all = notes.placeholders().get_all_placeholders()?;
    if all.is_empty() {
        println!("No placeholders found.");
        return Ok(());
    }

    for placeholder in all.values() {
        stdout.set_color(&colors::warning())?;
        write!(stdout, "[[{}]]", placeholder.link_text)?;
        stdout.set_color(&colors::dim())?;
        writeln!(
            stdout,
            " ({} {})",
            placeholder.sources.len(),
            pluralize(placeholder.sources.len(), "reference", "references")
        )?;
        stdout.reset()?;
        for source in &placeholder.sources {
            writeln!(stdout, "  {}:{}  {}", source.file.display(), source.line + 1, source.context)?;
        }
    }

    println!(
        "\nTotal: {} {}",
        all.len(),
        pluralize(all.len(), "placeholder", "placeholders")
    );
    Ok(())
}

pub fn embed_show(notes_dir: &Path, name: &str, section: Option<&str>) -> Result<()> {
    let notes = open(notes_dir)?;
    let path = find_note(&notes, name)?;

    match notes.embeds().get_embed_content(&path, section) {
        Some(content) => {
            println!("{}", content);
            Ok(())
        }
        None => match section {
            Some(section) => anyhow::bail!("Section '{}' not found in {}", section, path.display()),
            None => anyhow::bail!("Cannot read {}", path.display()),
        },
    }
}

pub fn embed_sections(notes_dir: &Path, name: &str, color: ColorChoice) -> Result<()> {
    let notes = open(notes_dir)?;
    let path = find_note(&notes, name)?;
    let sections = notes.embeds().get_sections_from_note(&path);

    if sections.is_empty() {
        println!("No sections in {}.", path.display());
        return Ok(());
    }

    let mut stdout = colors::create_stdout(color);
    for section in &sections {
        stdout.set_color(&colors::dim())?;
        write!(stdout, "#")?;
        stdout.reset()?;
        writeln!(stdout, "{}", section)?;
    }
    Ok(())
}

// ============================================================================
// Templates and bundles
// ============================================================================

pub fn template_list(notes_dir: &Path, color: ColorChoice) -> Result<()> {
    let notes = open(notes_dir)?;
    let templates = notes.list_templates()?;

    if templates.is_empty() {
        println!(
            "No templates found in {}",
            notes_dir.join(&notes.config().template_dir).display()
        );
        return Ok(());
    }

    let mut stdout = colors::create_stdout(color);
    for template in &templates {
        stdout.set_color(&colors::highlight())?;
        writeln!(stdout, "{}", template)?;
        stdout.reset()?;
    }
    Ok(())
}

pub fn bundle(notes_dir: &Path, workflow: &str, vars: &[String], color: ColorChoice) -> Result<()> {
    let vars = parse_vars(vars)?;
    let mut notes = open(notes_dir)?;
    let report = notes.run_bundle(workflow, &vars)?;

    let mut stdout = colors::create_stdout(color);
    for path in &report.created {
        stdout.set_color(&colors::success())?;
        write!(stdout, "created ")?;
        stdout.reset()?;
        writeln!(stdout, "{}", path.display())?;
    }
    for path in &report.skipped {
        stdout.set_color(&colors::warning())?;
        write!(stdout, "exists  ")?;
        stdout.reset()?;
        writeln!(stdout, "{}", path.display())?;
    }
    print_failures(&mut stdout, &report.failures)?;

    writeln!(
        stdout,
        "\n{} {} created, {} skipped",
        report.created.len(),
        pluralize(report.created.len(), "note", "notes"),
        report.skipped.len()
    )?;
    Ok(())
}

// ============================================================================
// Doctor
// ============================================================================

pub fn doctor(notes_dir: &Path, color: ColorChoice) -> Result<()> {
    let mut notes = open(notes_dir)?;
    let note_count = notes.note_paths()?.len();

    if note_count == 0 {
        println!("No notes found to check.");
        return Ok(());
    }

    println!(
        "Running health checks on {} {}...\n",
        note_count,
        pluralize(note_count, "note", "notes")
    );

    let report = notes.check_health()?;
    let mut stdout = colors::create_stdout(color);

    if !report.placeholders.is_empty() {
        stdout.set_color(&colors::error())?;
        writeln!(stdout, "Links to missing notes:")?;
        stdout.reset()?;
        for (path, targets) in &report.placeholders {
            writeln!(stdout, "  {}:", path.display())?;
            for target in targets {
                writeln!(stdout, "    - [[{}]]", target)?;
            }
        }
        writeln!(stdout)?;
    }

    if !report.invalid_tags.is_empty() {
        stdout.set_color(&colors::error())?;
        writeln!(stdout, "Invalid frontmatter tags:")?;
        stdout.reset()?;
        for (path, tags) in &report.invalid_tags {
            writeln!(stdout, "  {}: {}", path.display(), tags.join(", "))?;
        }
        writeln!(stdout)?;
    }

    if !report.notes_without_tags.is_empty() {
        stdout.set_color(&colors::warning())?;
        writeln!(stdout, "Notes without tags:")?;
        stdout.reset()?;
        for path in &report.notes_without_tags {
            writeln!(stdout, "  - {}", path.display())?;
        }
        writeln!(stdout)?;
    }

    if !report.orphaned_notes.is_empty() {
        stdout.set_color(&colors::warning())?;
        writeln!(stdout, "Orphaned notes (no links, no tags):")?;
        stdout.reset()?;
        for path in &report.orphaned_notes {
            writeln!(stdout, "  - {}", path.display())?;
        }
        writeln!(stdout)?;
    }

    let issues = report.issue_count();
    if issues == 0 {
        stdout.set_color(&colors::success())?;
        writeln!(stdout, "All checks passed! Your notes are healthy.")?;
        stdout.reset()?;
    } else {
        writeln!(
            stdout,
            "Found {} {} that may need attention.",
            issues,
            pluralize(issues, "issue", "issues")
        )?;
    }

    Ok(())
}
