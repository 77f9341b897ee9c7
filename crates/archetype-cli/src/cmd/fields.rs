use crate::output::{print_json, print_table};
use archetype_core::context::Context;
use std::path::Path;

/// List fields, either all of them or those active in one context.
pub fn run(root: &Path, context: Option<&str>, json: bool) -> anyhow::Result<()> {
    let site = super::load_site(root)?;

    let contexts: Vec<Context> = match context {
        Some(raw) => vec![raw.parse::<Context>()?],
        None => Context::all().to_vec(),
    };

    let mut listed = Vec::new();
    for &ctx in &contexts {
        let mut registry = site.contexts().clone();
        registry.set_context(ctx);
        for cf in registry.fields()? {
            listed.push(cf);
        }
    }

    if json {
        let list: Vec<serde_json::Value> = listed
            .iter()
            .map(|cf| {
                serde_json::json!({
                    "slug": cf.field.slug(),
                    "name": cf.field.name(),
                    "type": cf.field.kind(),
                    "meta_key": cf.field.meta_key(),
                    "required": cf.field.required(),
                    "context": cf.context,
                })
            })
            .collect();
        return print_json(&list);
    }

    if listed.is_empty() {
        println!("No fields.");
        return Ok(());
    }
    let rows = listed
        .iter()
        .map(|cf| {
            vec![
                cf.context.to_string(),
                cf.field.slug().to_string(),
                cf.field.name().to_string(),
                cf.field.kind().to_string(),
                if cf.field.required() { "yes" } else { "" }.to_string(),
            ]
        })
        .collect();
    print_table(&["CONTEXT", "SLUG", "NAME", "TYPE", "REQUIRED"], rows);
    Ok(())
}

/// List forms and the fields each one validates.
pub fn forms(root: &Path, json: bool) -> anyhow::Result<()> {
    let site = super::load_site(root)?;
    let forms = site.forms();

    if json {
        let list: Vec<serde_json::Value> = forms
            .names()
            .into_iter()
            .map(|name| {
                Ok(serde_json::json!({
                    "name": name,
                    "fields": forms.field_names(name)?,
                }))
            })
            .collect::<archetype_core::Result<_>>()?;
        return print_json(&list);
    }

    let mut rows = Vec::new();
    for name in forms.names() {
        rows.push(vec![name.to_string(), forms.field_names(name)?.join(", ")]);
    }
    print_table(&["FORM", "FIELDS"], rows);
    Ok(())
}
