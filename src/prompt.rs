//! Prompt text for every stage.
//!
//! Windows are rendered with absolute, 1-based line numbers; this is the only
//! place where the 0-based [`Window`] bounds become user-facing numbers.
//! Function names are always quoted in backticks.

use crate::walker::Language;
use crate::window::Window;

pub const SYSTEM_PROMPT: &str = "You are a precise source code analyst. Each request contains \
an instruction and, where a structured answer is needed, a JSON template. When a template is \
given, answer with JSON that follows it exactly and nothing else. Read line numbers carefully.";

/// Numbered listing of the lines under `window`, inside a code fence.
pub fn render_window(lines: &[String], window: &Window, language: Language) -> String {
    let mut out = format!("```{}\nline |\n----------------------------------\n", language.label());
    for (idx, line) in window.slice(lines).iter().enumerate() {
        out.push_str(&format!("{:>4} |\t{}\n", window.start() + idx + 1, line));
    }
    out.push_str("```\n");
    out
}

fn first_line(window: &Window) -> usize {
    window.start() + 1
}

pub fn enumerate(lines: &[String], window: &Window, language: Language) -> String {
    format!(
        "{snippet}\n\
         The {lang} code above is lines {from} to {to} of a larger file.\n\
         List every function or method that is defined in it, including `main`.\n\
         Do not add any explanation. Respond only with JSON in this format:\n\
         ```json\n[\n  {{ \"function_name\": \"<name>\" }}\n]\n```",
        snippet = render_window(lines, window, language),
        lang = language.label(),
        from = first_line(window),
        to = window.end(),
    )
}

pub fn locate(name: &str, lines: &[String], window: &Window, language: Language) -> String {
    format!(
        "{snippet}\n\
         The {lang} code above is lines {from} to {to} of a larger file. Do not modify or judge it.\n\
         Find the line where the definition of `{name}` starts and the line where it ends.\n\
         Briefly explain how you found them.",
        snippet = render_window(lines, window, language),
        lang = language.label(),
        from = first_line(window),
        to = window.end(),
        name = name,
    )
}

pub fn locate_final(name: &str) -> String {
    format!(
        "Finalize your answer for `{name}` using the line numbers shown in the listing.\n\
         Respond only with JSON in this format:\n\
         ```json\n{{ \"start_line\": <number>, \"end_line\": <number> }}\n```"
    )
}

pub fn verify(name: &str, start_line: i64, end_line: i64, language: Language) -> String {
    format!(
        "You said `{name}` spans lines {start_line} to {end_line}.\n\
         Check whether the whole body of `{name}` is shown in the {lang} listing, with nothing \
         cut off at the end. Briefly explain your answer.",
        lang = language.label(),
    )
}

pub fn verify_final(name: &str) -> String {
    format!(
        "Finalize: is the body of `{name}` entirely contained in the listing?\n\
         Respond only with JSON in this format:\n\
         ```json\n{{ \"result\": <true or false> }}\n```"
    )
}

pub fn extract(name: &str, language: Language) -> String {
    format!(
        "Describe what the {lang} function `{name}` does, which arguments it takes and what it \
         returns. Keep it short.",
        lang = language.label(),
    )
}

pub fn extract_final(name: &str) -> String {
    format!(
        "Finalize your description of `{name}`. Respond only with JSON in this format:\n\
         ```json\n{{\n  \"purpose\": \"<one or two sentences>\",\n  \"signature\": \"<declaration as written>\",\n  \
         \"arguments\": \"<each argument and its type>\",\n  \"return\": \"<return type and meaning>\"\n}}\n```"
    )
}
