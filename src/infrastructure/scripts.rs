//! Page script library
//!
//! Every script injected into the surface is built here from the site profile.
//! String arguments are JSON-encoded before being spliced into the source, so
//! codes or selectors containing quotes cannot break out of the literal.

use serde::Serialize;

/// What a script does, so surfaces and test doubles can tell them apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Rewrites popups and new-window clicks into same-surface navigation
    InstallContainment,
    /// Fills the first matching input with the code and fires input/change
    FillInput,
    /// Finds the submit control by keyword and clicks it or reports its href
    ScanSubmit,
    /// `true` when a selector matches at least one element
    SelectorPresent,
    /// Trimmed texts of the first result row's cells
    ReadRowCells,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageScript {
    pub kind: ScriptKind,
    pub source: String,
}

impl PageScript {
    fn new(kind: ScriptKind, source: String) -> Self {
        Self { kind, source }
    }
}

fn js_literal<T: Serialize + ?Sized>(value: &T) -> String {
    // Serializing strings and string slices cannot fail
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Marker property holding the installed click interceptor
pub const INTERCEPTOR_PROPERTY: &str = "__nsisNavigationInterceptor";

pub fn install_containment() -> PageScript {
    let source = format!(
        r#"(() => {{
    const KEY = {key};
    if (!window.__nsisOriginalOpen) {{
        window.__nsisOriginalOpen = window.open;
    }}
    window.open = function(url) {{
        if (url) {{ window.location.href = url; }}
        return window;
    }};
    if (window[KEY]) {{
        document.removeEventListener('click', window[KEY], true);
        document.removeEventListener('mousedown', window[KEY], true);
        document.removeEventListener('auxclick', window[KEY], true);
    }}
    const interceptor = (event) => {{
        const link = event.target && event.target.closest ? event.target.closest('a[href]') : null;
        if (!link) {{ return; }}
        const target = (link.getAttribute('target') || '').toLowerCase();
        const rel = (link.getAttribute('rel') || '').toLowerCase();
        const popup = target === '_blank' || target === '_new'
            || rel.includes('noopener') || rel.includes('noreferrer');
        const modified = event.ctrlKey || event.metaKey || event.shiftKey || event.altKey || event.button === 1;
        if (popup || modified) {{
            event.preventDefault();
            event.stopPropagation();
            event.stopImmediatePropagation();
            if (event.type !== 'mousedown') {{
                window.location.href = link.href;
            }}
        }}
    }};
    window[KEY] = interceptor;
    document.addEventListener('click', interceptor, true);
    document.addEventListener('mousedown', interceptor, true);
    document.addEventListener('auxclick', interceptor, true);
    return true;
}})()"#,
        key = js_literal(INTERCEPTOR_PROPERTY),
    );
    PageScript::new(ScriptKind::InstallContainment, source)
}

/// Returns `{selector}` for the input that received the code, or `null`
pub fn fill_input(selectors: &[String], code: &str) -> PageScript {
    let source = format!(
        r#"(() => {{
    const selectors = {selectors};
    const value = {code};
    for (const selector of selectors) {{
        const input = document.querySelector(selector);
        if (!input) {{ continue; }}
        input.focus();
        input.value = '';
        input.value = value;
        input.dispatchEvent(new Event('input', {{ bubbles: true }}));
        input.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return {{ selector }};
    }}
    return null;
}})()"#,
        selectors = js_literal(selectors),
        code = js_literal(code),
    );
    PageScript::new(ScriptKind::FillInput, source)
}

/// Two passes: form controls first, anchors only when no control matched.
///
/// Returns `{action: "click", text}` after clicking, `{action: "navigate", href, text}`
/// for anchors with an href (not clicked), or `null`.
pub fn scan_submit(control_selector: &str, anchor_selector: &str, keywords: &[String]) -> PageScript {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let source = format!(
        r#"(() => {{
    const keywords = {keywords};
    const textOf = (el) => (el.innerText || el.value || el.textContent || '').trim();
    const matches = (el) => {{
        const text = textOf(el).toLowerCase();
        return text.length > 0 && keywords.some((k) => text.includes(k));
    }};
    for (const el of document.querySelectorAll({controls})) {{
        if (matches(el)) {{
            el.click();
            return {{ action: 'click', text: textOf(el) }};
        }}
    }}
    for (const el of document.querySelectorAll({anchors})) {{
        if (!matches(el)) {{ continue; }}
        const href = el.getAttribute('href');
        if (href && !href.startsWith('#') && !href.toLowerCase().startsWith('javascript:')) {{
            return {{ action: 'navigate', href, text: textOf(el) }};
        }}
        el.click();
        return {{ action: 'click', text: textOf(el) }};
    }}
    return null;
}})()"#,
        keywords = js_literal(&lowered),
        controls = js_literal(control_selector),
        anchors = js_literal(anchor_selector),
    );
    PageScript::new(ScriptKind::ScanSubmit, source)
}

pub fn selector_present(selector: &str) -> PageScript {
    let source = format!("document.querySelector({}) !== null", js_literal(selector));
    PageScript::new(ScriptKind::SelectorPresent, source)
}

/// Returns an array of trimmed cell texts, empty when no row exists
pub fn read_row_cells(row_selector: &str) -> PageScript {
    let source = format!(
        r#"(() => {{
    const row = document.querySelector({row});
    if (!row) {{ return []; }}
    return Array.from(row.querySelectorAll('td')).map((td) => (td.innerText || td.textContent || '').trim());
}})()"#,
        row = js_literal(row_selector),
    );
    PageScript::new(ScriptKind::ReadRowCells, source)
}
