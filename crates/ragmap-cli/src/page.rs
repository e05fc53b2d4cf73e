//! HTML rendering for the admin page.
//!
//! Everything user- or store-supplied goes through [`escape`]; the template
//! only carries layout and styles.

use std::fmt::Write as _;

use ragmap_storage::{MappingSnapshot, TenantView};

use crate::session::Flash;

pub const PAGE_TITLE: &str = "Tenant RAG Mapping Manager";
const NO_TENANTS: &str = "No tenants found.";

fn render(title: &str, body: &str) -> String {
    let template = include_str!("../templates/page.html");
    template
        .replace("{{TITLE}}", &escape(title))
        .replace("{{BODY}}", body)
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn push_flash(body: &mut String, flash: Option<&Flash>) {
    if let Some(flash) = flash {
        let _ = writeln!(
            body,
            r#"<div class="{}" role="status">{}</div>"#,
            flash.kind.css_class(),
            escape(&flash.text)
        );
    }
}

/// An empty option list renders a disabled select.
fn push_select(body: &mut String, name: &str, options: &[String], selected: Option<usize>) {
    let state = if options.is_empty() { "disabled" } else { "required" };
    let _ = writeln!(body, r#"<select name="{name}" {state}>"#);
    for (i, option) in options.iter().enumerate() {
        let marker = if Some(i) == selected { " selected" } else { "" };
        let option = escape(option);
        let _ = writeln!(body, r#"  <option value="{option}"{marker}>{option}</option>"#);
    }
    body.push_str("</select>\n");
}

pub fn render_login(flash: Option<&Flash>) -> String {
    let mut body = format!("<h1>{}</h1>\n", escape(PAGE_TITLE));
    push_flash(&mut body, flash);
    body.push_str(
        r#"<form method="post" action="/login">
  <label for="email">Operator email</label>
  <input type="email" id="email" name="email" autocomplete="email" required>
  <button type="submit">Sign in</button>
</form>
"#,
    );
    render(PAGE_TITLE, &body)
}

/// Who is looking at the page.
pub struct Viewer<'a> {
    pub gate_enabled: bool,
    pub email: Option<&'a str>,
}

/// The mapping page. A load error replaces both sections.
pub fn render_index(
    viewer: &Viewer<'_>,
    flash: Option<&Flash>,
    snapshot: Result<&MappingSnapshot, String>,
) -> String {
    let mut body = String::new();
    body.push_str(r#"<div class="topbar">"#);
    let _ = write!(body, "<h1>{}</h1>", escape(PAGE_TITLE));
    if viewer.gate_enabled {
        let who = viewer.email.map(escape).unwrap_or_default();
        let _ = write!(
            body,
            r#"<form method="post" action="/logout" class="inline"><span class="muted">{who}</span> <button type="submit">Sign out</button></form>"#
        );
    }
    body.push_str("</div>\n");
    push_flash(&mut body, flash);

    let snapshot = match snapshot {
        Ok(snapshot) => snapshot,
        Err(message) => {
            let _ = writeln!(
                body,
                r#"<div class="flash error" role="alert">Could not load mappings: {}</div>"#,
                escape(&message)
            );
            return render(PAGE_TITLE, &body);
        }
    };

    let options = snapshot.display_options();
    push_add_section(&mut body, &options);

    body.push_str("<h2>Existing mappings</h2>\n");
    if snapshot.tenants.is_empty() {
        let _ = writeln!(body, r#"<div class="flash info">{NO_TENANTS}</div>"#);
    } else {
        for view in snapshot.views(&options) {
            push_tenant(&mut body, &view, &options);
        }
    }

    let _ = writeln!(
        body,
        r#"<form method="post" action="/refresh"><span class="muted">Loaded {}</span> <button type="submit">Refresh</button></form>"#,
        snapshot.loaded_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    render(PAGE_TITLE, &body)
}

fn push_add_section(body: &mut String, options: &[String]) {
    body.push_str("<h2>Add mapping</h2>\n");
    if options.is_empty() {
        body.push_str(r#"<p class="muted">The knowledge-base catalog is empty.</p>"#);
        body.push('\n');
        return;
    }
    body.push_str(
        r#"<form method="post" action="/tenants/create">
  <label for="new-contact">WhatsApp number</label>
  <input type="text" id="new-contact" name="contact" required>
  <label>Knowledge base</label>
"#,
    );
    push_select(body, "source", options, Some(0));
    body.push_str("  <button type=\"submit\">Add mapping</button>\n</form>\n");
}

fn push_tenant(body: &mut String, view: &TenantView<'_>, options: &[String]) {
    let tenant = view.tenant;
    let id = escape(tenant.id.as_str());
    let _ = writeln!(
        body,
        "<details>\n<summary>Tenant: {} ({})</summary>",
        escape(&tenant.contact),
        escape(&view.display_name)
    );
    let _ = writeln!(
        body,
        r#"<label>Current RAG source</label>
<input type="text" value="{}" readonly>
<label>WhatsApp number</label>
<input type="text" value="{}" readonly>
<form method="post" action="/tenants/update">
  <input type="hidden" name="id" value="{id}">
  <label>Knowledge base</label>"#,
        escape(tenant.source_code.as_str()),
        escape(&tenant.contact),
    );
    push_select(body, "source", options, view.selected);
    let save = if options.is_empty() { " disabled" } else { "" };
    let _ = writeln!(
        body,
        r#"  <button type="submit"{save}>Save Changes</button>
</form>
<form method="post" action="/tenants/delete">
  <input type="hidden" name="id" value="{id}">
  <label><input type="checkbox" name="confirm" value="yes"> Confirm deletion</label>
  <button type="submit" class="danger">Delete</button>
</form>
</details>"#
    );
}
