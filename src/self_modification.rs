//! Self-Modification Engine (C7)
//!
//! AST-level function replacement and whole-file rewrite, gated by the
//! Critic Coordinator and guarded by an automatic backup. The target
//! language here is Rust, so "AST-level code edits" (§9 design note) are
//! realized directly with `syn` (parse) and `prettyplease` (print) rather
//! than a tree-sitter grammar for a foreign language -- this is the
//! concrete-syntax-preserving CST pairing the design notes call for,
//! applied to the language the agent core itself is written in.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::critics::{CriticCoordinator, ReviewRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Applied; `renamed_to` is set when the replacement function's own
    /// name differs from the originally requested `function_name`.
    Applied { renamed_to: Option<String> },
    /// The diff between old and new code was empty; nothing was written.
    NoOp,
    FailedPreReview(String),
    CriticRejected,
    FailedDuringApply(String),
}

pub struct SelfModificationEngine<'a> {
    critics: &'a CriticCoordinator,
}

impl<'a> SelfModificationEngine<'a> {
    pub fn new(critics: &'a CriticCoordinator) -> Self {
        Self { critics }
    }

    /// Dotted `module_path` -> file path under `project_root`, the Rust
    /// realization of §4.7 step 1 ("tools.calculator" -> "tools/calculator.rs").
    pub fn resolve_module_path(project_root: &Path, module_path: &str) -> PathBuf {
        let relative: PathBuf = module_path.split('.').collect();
        project_root.join("src").join(relative).with_extension("rs")
    }

    fn find_function<'f>(file: &'f syn::File, function_name: &str) -> Option<&'f syn::ItemFn> {
        file.items.iter().find_map(|item| match item {
            syn::Item::Fn(f) if f.sig.ident == function_name => Some(f),
            _ => None,
        })
    }

    fn unparse_item(item: &syn::Item) -> String {
        let file = syn::File {
            shebang: None,
            attrs: Vec::new(),
            items: vec![item.clone()],
        };
        prettyplease::unparse(&file)
    }

    /// §4.7: resolve the file, find the current source of `function_name`,
    /// diff it against `new_code_string`, gate on critic unanimity, back up,
    /// parse both sides as single top-level functions, replace, and write.
    pub async fn edit_function_source_code(
        &self,
        module_path: &str,
        function_name: &str,
        new_code_string: &str,
        project_root: &Path,
        change_description: &str,
    ) -> Result<EditOutcome> {
        let path = Self::resolve_module_path(project_root, module_path);
        if !path.exists() {
            return Ok(EditOutcome::FailedPreReview(format!(
                "module path '{}' does not resolve to an existing file ({})",
                module_path,
                path.display()
            )));
        }

        let original_source =
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;

        let original_file: syn::File = match syn::parse_file(&original_source) {
            Ok(f) => f,
            Err(e) => {
                return Ok(EditOutcome::FailedPreReview(format!(
                    "could not parse existing file: {}",
                    e
                )))
            }
        };

        let Some(original_fn) = Self::find_function(&original_file, function_name) else {
            return Ok(EditOutcome::FailedPreReview(format!(
                "function '{}' not found in {}",
                function_name,
                path.display()
            )));
        };
        let original_fn_source = Self::unparse_item(&syn::Item::Fn(original_fn.clone()));

        // Step 3: compute unified diff; empty diff is a no-op success.
        let diff = similar::TextDiff::from_lines(original_fn_source.as_str(), new_code_string)
            .unified_diff()
            .header("original", "proposed")
            .to_string();
        if diff.trim().is_empty() {
            return Ok(EditOutcome::NoOp);
        }

        // Step 4: critic gate with two fresh reviewers (the coordinator is
        // constructed by the caller sized to the configured critic count).
        let (unanimous, _reviews) = self
            .critics
            .review(ReviewRequest {
                original_code: original_fn_source.clone(),
                new_code: new_code_string.to_string(),
                diff,
                requirements: change_description.to_string(),
                related_tests: None,
            })
            .await;
        if !unanimous {
            return Ok(EditOutcome::CriticRejected);
        }

        // Step 5: backup before any write.
        let backup_path = backup_path_for(&path);
        std::fs::copy(&path, &backup_path)
            .with_context(|| format!("backing up {} to {}", path.display(), backup_path.display()))?;

        // Step 6: parse the new code; its first top-level item must be a
        // function (sync or async -- `syn` represents both as `ItemFn`,
        // distinguished by `sig.asyncness`).
        let new_file = match syn::parse_file(new_code_string) {
            Ok(f) => f,
            Err(e) => {
                return Ok(EditOutcome::FailedDuringApply(format!(
                    "new code did not parse: {}",
                    e
                )))
            }
        };
        let Some(syn::Item::Fn(new_fn)) = new_file.items.first() else {
            return Ok(EditOutcome::FailedDuringApply(
                "new code's first top-level item is not a function".to_string(),
            ));
        };

        // Step 7: replace the first matching top-level function, recording
        // a rename if the replacement's own name differs.
        let mut mutated = original_file.clone();
        let mut replaced = false;
        let mut renamed_to = None;
        for item in mutated.items.iter_mut() {
            if let syn::Item::Fn(f) = item {
                if f.sig.ident == function_name {
                    if new_fn.sig.ident != function_name {
                        renamed_to = Some(new_fn.sig.ident.to_string());
                    }
                    *item = syn::Item::Fn(new_fn.clone());
                    replaced = true;
                    break;
                }
            }
        }
        if !replaced {
            return Ok(EditOutcome::FailedDuringApply(format!(
                "function '{}' disappeared between read and replace",
                function_name
            )));
        }

        // Step 8: unparse and write.
        let new_source = prettyplease::unparse(&mutated);
        std::fs::write(&path, new_source)
            .with_context(|| format!("writing {}", path.display()))?;

        Ok(EditOutcome::Applied { renamed_to })
    }

    /// Whole-file analog of `edit_function_source_code`. Creates parent
    /// directories, backs up only if the file pre-existed, and skips the
    /// write entirely if content is byte-identical (§4.7).
    pub fn edit_project_file(
        &self,
        absolute_path: &Path,
        new_content: &str,
        _change_description: &str,
    ) -> Result<EditOutcome> {
        if let Some(parent) = absolute_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        if absolute_path.exists() {
            let existing = std::fs::read_to_string(absolute_path)
                .with_context(|| format!("reading {}", absolute_path.display()))?;
            if existing == new_content {
                return Ok(EditOutcome::NoOp);
            }
            let backup_path = backup_path_for(absolute_path);
            std::fs::copy(absolute_path, &backup_path).with_context(|| {
                format!(
                    "backing up {} to {}",
                    absolute_path.display(),
                    backup_path.display()
                )
            })?;
        }

        std::fs::write(absolute_path, new_content)
            .with_context(|| format!("writing {}", absolute_path.display()))?;
        Ok(EditOutcome::Applied { renamed_to: None })
    }

    /// Revert `path` back to its `.bak` sibling's contents (used by the
    /// Action Executor when a post-modification test fails, §4.8).
    pub fn revert_from_backup(path: &Path) -> Result<()> {
        let backup_path = backup_path_for(path);
        if !backup_path.exists() {
            anyhow::bail!(crate::errors::SelfModError::BackupMissing(backup_path));
        }
        std::fs::copy(&backup_path, path)
            .with_context(|| format!("reverting {} from {}", path.display(), backup_path.display()))?;
        Ok(())
    }

    /// Parse `<file>.bak` and return the unparsed source of `function_name`
    /// if present.
    pub fn get_backup_function_source_code(
        module_path: &str,
        function_name: &str,
        project_root: &Path,
    ) -> Result<Option<String>> {
        let path = Self::resolve_module_path(project_root, module_path);
        let backup_path = backup_path_for(&path);
        if !backup_path.exists() {
            return Ok(None);
        }
        let source = std::fs::read_to_string(&backup_path)
            .with_context(|| format!("reading {}", backup_path.display()))?;
        let file: syn::File = syn::parse_file(&source)
            .with_context(|| format!("parsing {}", backup_path.display()))?;
        Ok(Self::find_function(&file, function_name)
            .map(|f| Self::unparse_item(&syn::Item::Fn(f.clone()))))
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".bak");
    PathBuf::from(os_string)
}
