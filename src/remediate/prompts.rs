//! Prompt templates and response schemas for every oracle call.

use serde_json::{Value, json};

use crate::model::{BugAgent, ProjectHints};

/// Tag wrapping each candidate patch returned by the fix proposer.
pub const FIX_TAG: &str = "fix";

/// Tag wrapping a complete file body returned by the patch applicator.
pub const FILE_TAG: &str = "file";

pub const PARSE_SYSTEM_PROMPT: &str = "You extract compiler and bundler errors from raw build output. \
You never invent errors that are not in the output. If the build succeeded or no errors are present, \
return an empty list.";

pub const PACKAGES_SYSTEM_PROMPT: &str = "You decide whether a failed build is caused by missing \
third-party packages. Only list packages that are imported but not installed; never list local \
modules or packages that merely have type errors.";

pub const FIX_SYSTEM_PROMPT: &str = "You are a senior engineer fixing build errors. You make the \
smallest change that resolves the errors while keeping the project's style, types and conventions.";

pub const APPLY_SYSTEM_PROMPT: &str = "You apply a proposed code change to a file and return the \
complete resulting file. You never omit, summarize or elide unrelated code.";

pub fn parse_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "errors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "filePath": { "type": ["string", "null"] },
                        "lineNumber": { "type": "integer" },
                        "errorType": { "type": "string" },
                        "errorMessage": { "type": "string" },
                        "codeWithError": { "type": ["string", "null"] }
                    },
                    "required": ["filePath", "lineNumber", "errorType", "errorMessage"]
                }
            }
        },
        "required": ["errors"]
    })
}

pub fn packages_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "needsNpmInstall": { "type": "boolean" },
            "packagesToInstall": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["needsNpmInstall", "packagesToInstall"]
    })
}

pub fn parse_prompt(raw_output: &str) -> String {
    format!(
        "Extract every error from this build output. For each error give the file path \
relative to the project root, the 1-based line number, a short error type or code \
(for example TS2304 or ModuleNotFound), the error message, and the offending code if shown.\n\n\
<build_output>\n{}\n</build_output>",
        raw_output
    )
}

pub fn packages_prompt(raw_output: &str) -> String {
    format!(
        "Does this build fail because packages need to be installed? Set needsNpmInstall \
and list the exact package names to install.\n\n<build_output>\n{}\n</build_output>",
        raw_output
    )
}

fn push_section(out: &mut String, title: &str, body: Option<&str>) {
    if let Some(body) = body.map(str::trim).filter(|b| !b.is_empty()) {
        out.push_str(&format!("\n## {}\n{}\n", title, body));
    }
}

pub fn fix_prompt(
    agent: &BugAgent,
    file_content: Option<&str>,
    hints: &ProjectHints,
    max_fixes: usize,
) -> String {
    let mut prompt = format!(
        "The file `{}` fails to build with these errors:\n{}\n",
        agent.file_path(),
        agent.error_summary()
    );

    match file_content {
        Some(content) => prompt.push_str(&format!(
            "\n## Current file content\n<current_file>\n{}\n</current_file>\n",
            content
        )),
        None => prompt.push_str(
            "\nThe file does not exist yet. A fix may describe the complete new file.\n",
        ),
    }

    push_section(&mut prompt, "Project types", hints.types.as_deref());
    push_section(&mut prompt, "Installed packages", hints.packages.as_deref());
    push_section(&mut prompt, "Code style", hints.style.as_deref());
    if !hints.file_source_map.is_empty() {
        let mut entries: Vec<_> = hints.file_source_map.iter().collect();
        entries.sort();
        let map = entries
            .into_iter()
            .map(|(path, desc)| format!("- {}: {}", path, desc))
            .collect::<Vec<_>>()
            .join("\n");
        push_section(&mut prompt, "Project files", Some(&map));
    }
    push_section(&mut prompt, "Research notes", hints.research.as_deref());

    prompt.push_str(&format!(
        "\nPropose up to {} alternative fixes, most likely first. Write each one as a \
diff-like change against the file and wrap each fix in <{tag}></{tag}> tags. \
Do not put anything except fixes inside the tags.",
        max_fixes,
        tag = FIX_TAG
    ));
    prompt
}

pub fn new_file_prompt(file_path: &str, patch: &str) -> String {
    format!(
        "Create the file `{path}` from this description of its content:\n\n{patch}\n\n\
Return the complete file wrapped in <{tag}></{tag}> tags.",
        path = file_path,
        patch = patch,
        tag = FILE_TAG
    )
}

pub fn existing_file_prompt(file_path: &str, numbered_content: &str, patch: &str) -> String {
    format!(
        "Apply this change to `{path}`:\n\n{patch}\n\n\
Here is the current file. Every line is prefixed with its line number as `N| `:\n\n\
{numbered}\n\n\
Return the ENTIRE updated file, keeping the `N| ` prefix on every line, wrapped in \
<{tag}></{tag}> tags.",
        path = file_path,
        patch = patch,
        numbered = numbered_content,
        tag = FILE_TAG
    )
}
