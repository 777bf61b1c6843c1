use std::borrow::Cow;
use std::fmt::Write;
use std::path::Path;

use pipeline::CatalogLayout;

use crate::remote::quote;

use super::Candidate;

fn escape(s: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(s))
}

/// A POSIX shell script that classifies every catalog entry on the remote host,
/// printing one line per candidate:
///
/// ```text
/// FOUND:<id>
/// EXIST:<id>
/// SKIP_ALL:<id>
/// MISSING:<id>:<label>,<label>
/// ```
pub fn scan_script(layout: &CatalogLayout, catalog: &Path, done: &Path, session: &str) -> String {
    let required = layout.required_roles().count();
    let mut script = String::with_capacity(2048);

    // writing to a String can't fail.
    let _ = writeln!(
        script,
        "for dir in {}/{}*; do",
        quote(catalog),
        escape(layout.item_prefix)
    );
    script.push_str("  [ -d \"$dir\" ] || continue\n");
    script.push_str("  item=$(basename \"$dir\")\n");
    script.push_str("  missing=\"\"\n");
    script.push_str("  count=0\n");
    for role in layout.required_roles() {
        let _ = writeln!(
            script,
            "  [ -f \"$dir\"/{}\"$item\"{} ] || {{ missing=\"$missing\",{}; count=$((count+1)); }}",
            escape(&format!("{session}/{}/", role.category)),
            escape(&format!("_{session}_{}", role.suffix)),
            escape(role.label),
        );
    }
    let _ = writeln!(script, "  if [ \"$count\" -eq 0 ]; then");
    let _ = writeln!(
        script,
        "    if [ -f {}/\"$item\"{} ]; then echo \"EXIST:$item\"; else echo \"FOUND:$item\"; fi",
        quote(done),
        escape(&format!("_{session}/{}", layout.output_target)),
    );
    let _ = writeln!(script, "  elif [ \"$count\" -eq {required} ]; then");
    script.push_str("    echo \"SKIP_ALL:$item\"\n");
    script.push_str("  else\n");
    script.push_str("    echo \"MISSING:$item:${missing#,}\"\n");
    script.push_str("  fi\n");
    script.push_str("done\n");
    script
}

/// Parse the output of `scan_script`. Unrecognized lines are skipped.
pub fn parse_scan_output(output: &str) -> Vec<(String, Candidate)> {
    let mut candidates = Vec::with_capacity(128);
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((tag, rest)) = line.split_once(':') else {
            log::debug!("Ignoring remote scan line {line:?}");
            continue;
        };
        let (id, candidate) = match tag {
            "FOUND" => (rest, Candidate::Eligible),
            "EXIST" => (rest, Candidate::OutputExists),
            "SKIP_ALL" => (rest, Candidate::MissingAll),
            "MISSING" => {
                let (id, labels) = rest.split_once(':').unwrap_or((rest, ""));
                let labels = labels
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_owned)
                    .collect();
                (id, Candidate::MissingSome(labels))
            }
            _ => {
                log::debug!("Ignoring remote scan line {line:?}");
                continue;
            }
        };
        if id.is_empty() {
            log::debug!("Ignoring remote scan line {line:?}");
            continue;
        }
        candidates.push((id.to_owned(), candidate));
    }
    candidates
}
