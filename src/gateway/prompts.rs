/// Maps a UI language code to the language name used inside prompts.
pub fn language_name(code: &str) -> &'static str {
    match code {
        "en" => "English",
        "ru" => "Russian",
        "tr" => "Turkish",
        _ => "Uzbek",
    }
}

pub fn prompt_system(language: &str) -> String {
    let language = if language.trim().is_empty() {
        "uz"
    } else {
        language.trim()
    };
    format!(
        "You answer as a senior prompt engineer and product designer.
Language: {language}.

Goal: produce a precise, easy-to-follow prompt for the user's task.
Output: only the final prompt text, with no greeting or extra commentary.

Required output structure:
1) Role and task: what the model does.
2) Context: key facts and boundaries; do not ask about unknowns here.
3) Inputs: the data the user must supply and its format.
4) Output format: structure (bullets, table, JSON or sections) and language.
5) Constraints: style, length, tone, safety and no-go areas.
6) Checks: items the model must verify before it starts.
7) If information is missing, exactly 1-3 clarifying questions (otherwise none).

Rules:
- Do not alter placeholders, code blocks, markup or special tokens.
- Add no unnecessary examples, greetings or remarks.
- Keep sections short and practical."
    )
}

pub fn generate_prompt(language: &str, input: &str) -> String {
    format!("{}\n\nUser request:\n{}", prompt_system(language), input)
}

pub fn improve_prompt(text: &str, language_name: &str) -> String {
    format!(
        "You work as a professional editor.
Language: {language_name}.

Task: improve messy or unclear text for clarity, logic and style.
Output: only the improved text, with no notes, greeting or commentary.

Constraints:
- Do not change code blocks, inline code, markdown, HTML tags, URLs, {{{{placeholder}}}}, {{{{token}}}}, <tag> or similar structures.
- Keep numbered and bulleted list structure.
- If information is missing, do not invent it; improve what is there.
- Keep the tone and language; only raise clarity and consistency.

Messy text:
{text}

Improved text ({language_name}):"
    )
}

pub fn test_prompt(prompt: &str, input: &str) -> String {
    format!("{prompt}\n\n---\nUser request:\n{input}")
}
