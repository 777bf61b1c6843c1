use std::borrow::Cow;

use util::HashMap;

use crate::Error;

/// Values substituted for `{name}` placeholders in stage templates.
#[derive(Debug, Default, Clone)]
pub struct Vars {
    map: HashMap<String, String>,
}

impl Vars {
    pub fn insert(&mut self, k: impl Into<String>, v: impl Into<String>) {
        self.map.insert(k.into(), v.into());
    }

    pub fn get(&self, k: &str) -> Option<&str> {
        self.map.get(k).map(String::as_str)
    }

    /// Substitute every `{name}` in `template`.
    pub fn render(&self, template: &str) -> Result<String, Error> {
        self.render_with(template, Cow::Borrowed)
    }

    /// Like `render`, but each value is quoted for `sh`/`bash`, so paths
    /// containing spaces stay one word. The template text itself is left alone.
    pub fn render_shell(&self, template: &str) -> Result<String, Error> {
        self.render_with(template, |v| shell_escape::unix::escape(Cow::Borrowed(v)))
    }

    fn render_with<'v, F>(&'v self, template: &str, quote: F) -> Result<String, Error>
    where
        F: Fn(&'v str) -> Cow<'v, str>,
    {
        let mut out = String::with_capacity(template.len() + 64);
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after
                .find('}')
                .ok_or_else(|| Error::Unterminated(template.to_owned()))?;
            let name = &after[..end];
            let value = self
                .get(name)
                .ok_or_else(|| Error::UnknownPlaceholder(name.to_owned(), template.to_owned()))?;
            out.push_str(&quote(value));
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// One action inside a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Run `program` with templated args.
    Run { program: String, args: Vec<String> },
    /// Run a templated command line with `bash -c` (for redirections).
    Shell(String),
    /// Write literal `contents` to a templated path.
    Write { file: String, contents: String },
}

/// A named, ordered group of steps that succeeds or fails as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub steps: Vec<Step>,
    /// Extra diagnostic logged when this stage fails.
    pub hint: Option<String>,
}

impl Stage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            steps: Vec::with_capacity(4),
            hint: None,
        }
    }

    pub fn run<I, S>(mut self, program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(Step::Run {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn shell(mut self, line: &str) -> Self {
        self.steps.push(Step::Shell(line.to_owned()));
        self
    }

    pub fn write(mut self, file: &str, contents: impl Into<String>) -> Self {
        self.steps.push(Step::Write {
            file: file.to_owned(),
            contents: contents.into(),
        });
        self
    }

    pub fn hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_owned());
        self
    }
}

/// Stages run in order; later stages read earlier stages' outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vars {
        let mut vars = Vars::default();
        vars.insert("out", "/work/sub-1_ses-01");
        vars.insert("t1w", "/bids/t1.nii.gz");
        vars
    }

    #[test]
    fn test_render_substitutes_all() {
        let rendered = vars().render("--in={t1w} --out={out}/T1w_brain").unwrap();
        assert_eq!(
            rendered,
            "--in=/bids/t1.nii.gz --out=/work/sub-1_ses-01/T1w_brain"
        );
    }

    #[test]
    fn test_render_shell_quotes_values_only() {
        let mut vars = vars();
        vars.insert("bvec", "/my data/dwi.bvec");
        let rendered = vars.render_shell("paste -d ' ' {bvec} > {out}/x").unwrap();
        assert_eq!(rendered, "paste -d ' ' '/my data/dwi.bvec' > /work/sub-1_ses-01/x");
    }

    #[test]
    fn test_render_plain_text() {
        assert_eq!(vars().render("-Tmean").unwrap(), "-Tmean");
    }

    #[test]
    fn test_render_unknown_placeholder() {
        let err = vars().render("{missing}/x").unwrap_err();
        assert_eq!(
            err,
            Error::UnknownPlaceholder("missing".to_owned(), "{missing}/x".to_owned())
        );
    }

    #[test]
    fn test_render_unterminated() {
        assert!(matches!(
            vars().render("{out"),
            Err(Error::Unterminated(_))
        ));
    }

    #[test]
    fn test_builder_keeps_step_order() {
        let stage = Stage::new("prep")
            .write("{out}/a.txt", "1")
            .run("true", ["x"])
            .shell("echo hi > {out}/b.txt");
        assert_eq!(stage.steps.len(), 3);
        assert!(matches!(stage.steps[0], Step::Write { .. }));
        assert!(matches!(stage.steps[2], Step::Shell(_)));
    }
}
