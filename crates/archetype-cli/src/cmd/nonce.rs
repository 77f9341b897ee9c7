use crate::output::print_json;
use archetype_core::user::{FileUserStore, Principal, UserId, UserStore};
use std::path::Path;

/// Print a nonce for `action`, bound to `user` or to the anonymous visitor.
pub fn run(root: &Path, action: &str, user: Option<UserId>, json: bool) -> anyhow::Result<()> {
    let site = super::load_site(root)?;
    let principal = match user {
        Some(id) => FileUserStore::open(root).user(id)?.principal(),
        None => Principal::anonymous(),
    };
    let nonce = site.nonces().create(action, &principal);

    if json {
        print_json(&serde_json::json!({ "action": action, "nonce": nonce }))
    } else {
        println!("{nonce}");
        Ok(())
    }
}
