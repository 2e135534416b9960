use crate::model::{Category, Vault};

/// The fixed default category set. These always exist and occupy sort
/// positions `0..N-1`; user-created categories are renumbered after them.
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Produce", "🥦"),
    ("Dairy", "🧀"),
    ("Meat & Fish", "🐟"),
    ("Bakery", "🍞"),
    ("Pantry", "🥫"),
    ("Frozen", "🧊"),
    ("Drinks", "🥤"),
    ("Household", "🧹"),
    ("Other", "🛒"),
];

pub fn first_default_category_name() -> &'static str {
    DEFAULT_CATEGORIES[0].0
}

fn is_default_name(name: &str) -> bool {
    let needle = name.trim();
    DEFAULT_CATEGORIES
        .iter()
        .any(|(canonical, _)| canonical.eq_ignore_ascii_case(needle))
}

/// Reconciles the stored categories against the fixed default set.
///
/// Missing defaults are created at their canonical positions, trivially
/// misformatted names are normalised, and custom categories are renumbered
/// to follow the default block while preserving their relative order.
/// Returns whether anything changed, so callers persist only on a delta.
pub fn reconcile_default_categories(vault: &mut Vault) -> bool {
    let mut changed = false;

    for (idx, (canonical, emoji)) in DEFAULT_CATEGORIES.iter().enumerate() {
        let position = idx as i64;
        match vault.find_category_mut(canonical) {
            Some(category) => {
                if category.name != *canonical {
                    category.name = (*canonical).to_string();
                    changed = true;
                }
                if category.sort_order != position {
                    category.sort_order = position;
                    changed = true;
                }
            }
            None => {
                let mut category = Category::new(*canonical, position);
                category.emoji = Some((*emoji).to_string());
                vault.categories.push(category);
                changed = true;
            }
        }
    }

    // Custom categories: stable order by (sort_order, name), renumbered to
    // start immediately after the default block.
    let default_len = DEFAULT_CATEGORIES.len() as i64;
    let mut custom: Vec<usize> = vault
        .categories
        .iter()
        .enumerate()
        .filter(|(_, c)| !is_default_name(&c.name))
        .map(|(i, _)| i)
        .collect();
    custom.sort_by(|&a, &b| {
        let (ca, cb) = (&vault.categories[a], &vault.categories[b]);
        ca.sort_order
            .cmp(&cb.sort_order)
            .then_with(|| ca.name.cmp(&cb.name))
    });
    for (offset, &index) in custom.iter().enumerate() {
        let position = default_len + offset as i64;
        if vault.categories[index].sort_order != position {
            vault.categories[index].sort_order = position;
            changed = true;
        }
    }

    if !vault
        .categories
        .windows(2)
        .all(|w| w[0].sort_order <= w[1].sort_order)
    {
        vault.categories.sort_by_key(|c| c.sort_order);
        changed = true;
    }

    changed
}
