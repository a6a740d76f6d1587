//! Site DOM heuristics: selectors, script snippets and text rules.
//!
//! Everything that is coupled to how the target site currently renders
//! lives here, in one place, because this mapping is expected to rot and be
//! replaced. The rest of the engine only sees the port traits the bridge
//! implements on top of these snippets.

use serde::{Deserialize, Serialize};

fn js_str(raw: &str) -> String {
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteMap {
    pub cart_url: String,
    /// `{id}` is replaced with the listing id.
    pub product_url_template: String,
    /// URL fragments that mean the session landed on a login/verification
    /// surface.
    pub challenge_url_needles: Vec<String>,
    /// Ordered (needle, reason) rules applied to visible toast/page text
    /// when an add produced no success signal.
    pub rejection_rules: Vec<(String, String)>,
    pub success_toast_needles: Vec<String>,
}

impl Default for SiteMap {
    fn default() -> Self {
        Self {
            cart_url: "https://cart.example.com/cart.htm".to_string(),
            product_url_template: "https://item.example.com/item.htm?id={id}".to_string(),
            challenge_url_needles: vec![
                "login".to_string(),
                "passport".to_string(),
                "punish".to_string(),
                "captcha".to_string(),
                "verify".to_string(),
            ],
            rejection_rules: vec![
                ("库存不足".to_string(), "insufficient stock".to_string()),
                ("stock".to_string(), "insufficient stock".to_string()),
                ("请选择".to_string(), "selection incomplete".to_string()),
                ("select".to_string(), "selection incomplete".to_string()),
                ("频繁".to_string(), "rate limited".to_string()),
                ("too often".to_string(), "rate limited".to_string()),
                ("验证".to_string(), "verification required".to_string()),
                ("下架".to_string(), "listing delisted".to_string()),
                ("unavailable".to_string(), "listing delisted".to_string()),
            ],
            success_toast_needles: vec![
                "成功".to_string(),
                "added".to_string(),
                "success".to_string(),
            ],
        }
    }
}

impl SiteMap {
    pub fn product_url(&self, listing_id: &str) -> String {
        self.product_url_template.replace("{id}", listing_id)
    }

    /// All cart line items with their raw fields, in document order.
    pub fn collect_line_items_js(&self) -> String {
        r#"(() => {
    const items = document.querySelectorAll('.cart-item, [data-cart-item]');
    return Array.from(items, (item) => {
        const text = (sel) => {
            const el = item.querySelector(sel);
            return el ? el.textContent.trim() : '';
        };
        const priceBox = item.querySelector('.item-price, .price-now');
        const origBox = item.querySelector('.item-price-original, .price-original');
        const pair = (box) => box ? {
            int_part: (box.querySelector('.price-int') || box).textContent.trim(),
            dec_part: box.querySelector('.price-dec') ? box.querySelector('.price-dec').textContent.trim() : ''
        } : null;
        const img = item.querySelector('img.item-pic, .item-pic img');
        const link = item.querySelector('a.item-title, a[href*="item.htm"]');
        const qty = item.querySelector('.item-quantity input, .quantity input');
        return {
            title: link ? link.textContent.trim() : text('.item-title'),
            imageHref: img ? (img.getAttribute('src') || img.getAttribute('data-src')) : null,
            price: pair(priceBox) || { int_part: '', dec_part: '' },
            originalPrice: pair(origBox),
            propLabels: Array.from(item.querySelectorAll('.sku-prop, .item-props span'), (el) => el.textContent.trim()).filter(Boolean),
            detailHref: link ? link.getAttribute('href') : null,
            quantity: qty ? parseInt(qty.value, 10) || 1 : 1
        };
    });
})()"#
            .to_string()
    }

    /// `[ { variantId, props } ]` for the given listing among loaded items.
    pub fn listing_entries_js(&self, listing_id: &str) -> String {
        format!(
            r#"(() => {{
    const wanted = {listing};
    const items = document.querySelectorAll('.cart-item, [data-cart-item]');
    const out = [];
    for (const item of items) {{
        const link = item.querySelector('a.item-title, a[href*="item.htm"]');
        if (!link) continue;
        let url;
        try {{ url = new URL(link.getAttribute('href'), location.href); }} catch (e) {{ continue; }}
        if (url.searchParams.get('id') !== wanted) continue;
        out.push({{
            variantId: url.searchParams.get('skuId'),
            props: Array.from(item.querySelectorAll('.sku-prop, .item-props span'), (el) => el.textContent.trim()).filter(Boolean).join(';')
        }});
    }}
    return out;
}})()"#,
            listing = js_str(listing_id)
        )
    }

    pub fn declared_total_js(&self) -> String {
        r#"(() => {
    const el = document.querySelector('.cart-count-total, [data-cart-total]');
    if (!el) return null;
    const n = parseInt(el.textContent.replace(/\D/g, ''), 10);
    return Number.isFinite(n) ? n : null;
})()"#
            .to_string()
    }

    pub fn end_marker_js(&self) -> String {
        r#"!!document.querySelector('.cart-end, .recommend-section, [data-cart-end]')"#.to_string()
    }

    pub fn scroll_position_js(&self) -> String {
        "Math.round(window.scrollY || document.documentElement.scrollTop || 0)".to_string()
    }

    pub fn scroll_by_js(&self, delta_y: i64) -> String {
        format!("window.scrollBy(0, {delta_y}); true")
    }

    /// State of one option control: "missing" | "selected" | "disabled" |
    /// "selectable".
    pub fn option_state_js(&self, prop_name: &str, value_name: &str) -> String {
        format!(
            r#"(() => {{
    const dim = {prop};
    const val = {value};
    const rows = document.querySelectorAll('.sku-row, [data-sku-prop]');
    for (const row of rows) {{
        const label = row.querySelector('.sku-row-title, dt');
        if (!label || label.textContent.trim().indexOf(dim) === -1) continue;
        const options = row.querySelectorAll('.sku-option, li, a');
        for (const opt of options) {{
            if (opt.textContent.trim() !== val) continue;
            const cls = opt.className || '';
            if (/\bdisabled\b/.test(cls) || opt.getAttribute('aria-disabled') === 'true') return 'disabled';
            if (/\b(selected|current|active)\b/.test(cls) || opt.getAttribute('aria-checked') === 'true') return 'selected';
            return 'selectable';
        }}
        return 'missing';
    }}
    return 'missing';
}})()"#,
            prop = js_str(prop_name),
            value = js_str(value_name)
        )
    }

    /// Click the matching option control; returns whether one was found.
    pub fn click_option_js(&self, prop_name: &str, value_name: &str) -> String {
        format!(
            r#"(() => {{
    const dim = {prop};
    const val = {value};
    const rows = document.querySelectorAll('.sku-row, [data-sku-prop]');
    for (const row of rows) {{
        const label = row.querySelector('.sku-row-title, dt');
        if (!label || label.textContent.trim().indexOf(dim) === -1) continue;
        for (const opt of row.querySelectorAll('.sku-option, li, a')) {{
            if (opt.textContent.trim() === val) {{ opt.click(); return true; }}
        }}
    }}
    return false;
}})()"#,
            prop = js_str(prop_name),
            value = js_str(value_name)
        )
    }

    /// Dimension titles with no selected option.
    pub fn unselected_dimensions_js(&self) -> String {
        r#"(() => {
    const out = [];
    for (const row of document.querySelectorAll('.sku-row, [data-sku-prop]')) {
        const label = row.querySelector('.sku-row-title, dt');
        if (!label) continue;
        const selected = row.querySelector('.sku-option.selected, .sku-option.current, [aria-checked="true"]');
        if (!selected) out.push(label.textContent.trim());
    }
    return out;
})()"#
            .to_string()
    }

    pub fn add_to_cart_state_js(&self) -> String {
        r#"(() => {
    const btn = document.querySelector('#add-to-cart, .add-to-cart, [data-add-cart]');
    if (!btn) return { present: false, enabled: false };
    const cls = btn.className || '';
    const disabled = btn.disabled === true || /\bdisabled\b/.test(cls) || btn.getAttribute('aria-disabled') === 'true';
    return { present: true, enabled: !disabled };
})()"#
            .to_string()
    }

    /// Viewport center of the add-to-cart control.
    pub fn add_to_cart_center_js(&self) -> String {
        r#"(() => {
    const btn = document.querySelector('#add-to-cart, .add-to-cart, [data-add-cart]');
    if (!btn) return null;
    btn.scrollIntoView({ block: 'center' });
    const rect = btn.getBoundingClientRect();
    return { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };
})()"#
            .to_string()
    }

    pub fn cart_count_js(&self) -> String {
        r#"(() => {
    const el = document.querySelector('.cart-count, #mini-cart-count, [data-cart-count]');
    if (!el) return null;
    const n = parseInt(el.textContent.replace(/\D/g, ''), 10);
    return Number.isFinite(n) ? n : null;
})()"#
            .to_string()
    }

    pub fn visible_toast_js(&self) -> String {
        r#"(() => {
    const toast = document.querySelector('.toast:not([hidden]), .message-box, [role="alert"]');
    return toast ? toast.textContent.trim() : null;
})()"#
            .to_string()
    }

    pub fn page_notice_js(&self) -> String {
        r#"(() => {
    const el = document.querySelector('.error-notice, .sold-out-notice, .toast:not([hidden]), [role="alert"]');
    return el ? el.textContent.trim() : null;
})()"#
            .to_string()
    }

    /// Close feature tours and promo overlays; returns how many were closed.
    pub fn dismiss_obstructions_js(&self) -> String {
        r#"(() => {
    let closed = 0;
    for (const el of document.querySelectorAll('.tour-close, .modal-close, .dialog-close, .overlay [data-close]')) {
        el.click();
        closed += 1;
    }
    return closed;
})()"#
            .to_string()
    }

    pub fn dismiss_confirmation_js(&self) -> String {
        r#"(() => {
    const el = document.querySelector('.add-cart-confirm .close, .added-popup .close');
    if (el) { el.click(); return true; }
    return false;
})()"#
            .to_string()
    }

    /// Non-null when the page is a login/verification surface.
    pub fn challenge_js(&self) -> String {
        let needles = serde_json::to_string(&self.challenge_url_needles)
            .unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"(() => {{
    const needles = {needles};
    const href = location.href.toLowerCase();
    for (const needle of needles) {{
        if (href.indexOf(needle) !== -1) return 'redirected to ' + location.hostname + location.pathname;
    }}
    if (document.querySelector('#nocaptcha, .nc-container, .captcha-box, form[action*="login"]')) {{
        return 'verification widget present';
    }}
    return null;
}})()"#
        )
    }

    /// First matching rejection rule for the given visible text.
    pub fn rejection_reason_for(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        self.rejection_rules
            .iter()
            .find(|(needle, _)| lowered.contains(&needle.to_lowercase()))
            .map(|(_, reason)| reason.clone())
    }

    pub fn is_success_toast(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.success_toast_needles
            .iter()
            .any(|needle| lowered.contains(&needle.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_url_substitutes_the_listing_id() {
        let site = SiteMap::default();
        assert_eq!(
            site.product_url("42"),
            "https://item.example.com/item.htm?id=42"
        );
    }

    #[test]
    fn rejection_rules_apply_in_order() {
        let site = SiteMap::default();
        assert_eq!(
            site.rejection_reason_for("商品库存不足，请稍后再试"),
            Some("insufficient stock".to_string())
        );
        assert_eq!(
            site.rejection_reason_for("Please SELECT a size first"),
            Some("selection incomplete".to_string())
        );
        assert_eq!(site.rejection_reason_for("all fine here"), None);
    }

    #[test]
    fn success_toast_matching_is_case_insensitive() {
        let site = SiteMap::default();
        assert!(site.is_success_toast("Added to cart!"));
        assert!(site.is_success_toast("加入购物车成功"));
        assert!(!site.is_success_toast("something went wrong"));
    }

    #[test]
    fn js_builders_escape_embedded_strings() {
        let site = SiteMap::default();
        let js = site.option_state_js("颜色\"分类", "红色's");
        assert!(js.contains(r#""颜色\"分类""#));
        assert!(js.contains(r#""红色's""#));
    }
}
