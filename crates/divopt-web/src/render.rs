//! Server-side HTML and SVG rendering for the dashboard page.

use std::collections::BTreeMap;

use divopt_warehouse::{ContractRow, ExpirationBounds, OptionKind, PremiumBounds};

use crate::filters::ContractFilters;

const CHART_WIDTH: f64 = 720.0;
const CHART_HEIGHT: f64 = 360.0;
const MARGIN: f64 = 56.0;
const CALL_COLOR: &str = "#1f77b4";
const PUT_COLOR: &str = "#d62728";

/// Everything the page needs, gathered from the warehouse in one pass.
#[derive(Debug, Default)]
pub struct DashboardView {
    pub filters: ContractFilters,
    pub refresh_secs: u64,
    pub stored_contracts: usize,
    pub tickers: Vec<String>,
    pub expiration_bounds: Option<ExpirationBounds>,
    pub premium_bounds: Option<PremiumBounds>,
    pub last_observed_at: Option<String>,
    pub rows: Vec<ContractRow>,
    pub error: Option<String>,
}

/// Escape text for HTML element content and quoted attribute values.
pub fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn page(view: &DashboardView) -> String {
    let mut html = String::with_capacity(16 * 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    if view.refresh_secs > 0 {
        html.push_str(&format!(
            "<meta http-equiv=\"refresh\" content=\"{}\">\n",
            view.refresh_secs
        ));
    }
    html.push_str("<title>Dividend Options Premium Dashboard</title>\n");
    html.push_str(STYLE);
    html.push_str("</head>\n<body>\n<h1>Dividend Options Premium Dashboard</h1>\n");
    html.push_str(
        "<p class=\"lead\">Options chains for dividend-paying companies. \
         Narrow the contracts with the filters to find the most attractive premiums.</p>\n",
    );

    html.push_str(&filter_form(view));

    if let Some(error) = &view.error {
        html.push_str(&format!("<p class=\"error\">{}</p>\n", escape(error)));
    }

    if view.stored_contracts == 0 {
        html.push_str(
            "<p class=\"notice\">The warehouse is empty. Run <code>divopt fetch</code> to populate it.</p>\n",
        );
    } else if view.error.is_none() {
        html.push_str(&summary(view));
        if view.rows.is_empty() {
            html.push_str(
                "<p class=\"notice\">No option contracts match the selected filters. Try widening the criteria.</p>\n",
            );
        } else {
            html.push_str("<h2>Contract Details</h2>\n");
            html.push_str(&contract_table(&view.rows));
            html.push_str("<h2>Implied Volatility vs. Strike</h2>\n");
            html.push_str(&scatter_svg(&view.rows));
            html.push_str("<h2>Premium Heatmap</h2>\n");
            html.push_str(&heatmap_svg(&view.rows));
        }
    }

    html.push_str(
        "<footer>Data updates as the background fetcher writes to the warehouse.</footer>\n</body>\n</html>\n",
    );
    html
}

fn filter_form(view: &DashboardView) -> String {
    let filters = &view.filters;
    let value = |field: &Option<String>| escape(field.as_deref().unwrap_or_default());
    let selected_type = filters.option_type.as_deref().unwrap_or("both").to_ascii_lowercase();
    let option = |name: &str, label: &str| {
        let selected = if selected_type == name { " selected" } else { "" };
        format!("<option value=\"{name}\"{selected}>{label}</option>")
    };

    let (date_min, date_max) = view
        .expiration_bounds
        .as_ref()
        .map(|bounds| (escape(&bounds.earliest), escape(&bounds.latest)))
        .unwrap_or_default();
    let premium_hint = view
        .premium_bounds
        .map(|bounds| format!("{:.2} to {:.2}", bounds.min, bounds.max))
        .unwrap_or_default();
    let ticker_hint = escape(&view.tickers.join(", "));

    format!(
        "<form method=\"get\" action=\"/\" class=\"filters\">\n\
         <label>Tickers <input name=\"tickers\" value=\"{tickers}\" placeholder=\"{ticker_hint}\"></label>\n\
         <label>Type <select name=\"type\">{both}{call}{put}</select></label>\n\
         <label>Expires from <input type=\"date\" name=\"from\" value=\"{from}\" min=\"{date_min}\" max=\"{date_max}\"></label>\n\
         <label>to <input type=\"date\" name=\"to\" value=\"{to}\" min=\"{date_min}\" max=\"{date_max}\"></label>\n\
         <label>Premium min <input name=\"min_premium\" value=\"{min_premium}\" placeholder=\"{premium_hint}\" inputmode=\"decimal\"></label>\n\
         <label>max <input name=\"max_premium\" value=\"{max_premium}\" inputmode=\"decimal\"></label>\n\
         <label>Max strike distance <input name=\"max_strike_distance\" value=\"{distance}\" placeholder=\"0.10\" inputmode=\"decimal\"></label>\n\
         <label>Limit <input name=\"limit\" value=\"{limit}\" inputmode=\"numeric\"></label>\n\
         <button type=\"submit\">Apply</button>\n\
         </form>\n",
        tickers = value(&filters.tickers),
        both = option("both", "Both"),
        call = option("call", "Calls"),
        put = option("put", "Puts"),
        from = value(&filters.from),
        to = value(&filters.to),
        min_premium = value(&filters.min_premium),
        max_premium = value(&filters.max_premium),
        distance = value(&filters.max_strike_distance),
        limit = value(&filters.limit),
    )
}

fn summary(view: &DashboardView) -> String {
    let mut shown_tickers: Vec<&str> = view.rows.iter().map(|row| row.ticker.as_str()).collect();
    shown_tickers.sort_unstable();
    shown_tickers.dedup();

    format!(
        "<section class=\"summary\">\n\
         <div><span>Contracts shown</span><strong>{shown}</strong></div>\n\
         <div><span>Tickers shown</span><strong>{tickers}</strong></div>\n\
         <div><span>Contracts stored</span><strong>{stored}</strong></div>\n\
         <div><span>Last observation (UTC)</span><strong>{last}</strong></div>\n\
         </section>\n",
        shown = view.rows.len(),
        tickers = shown_tickers.len(),
        stored = view.stored_contracts,
        last = escape(view.last_observed_at.as_deref().unwrap_or("-")),
    )
}

fn contract_table(rows: &[ContractRow]) -> String {
    let mut html = String::from(
        "<table>\n<thead><tr><th>Ticker</th><th>Contract</th><th>Expiration</th><th>Strike</th>\
         <th>Type</th><th>Bid</th><th>Ask</th><th>Last</th><th>Volume</th><th>Open Int.</th>\
         <th>IV</th><th>Delta</th><th>Gamma</th><th>Theta</th><th>Vega</th><th>Spot</th>\
         <th>Distance</th><th>Observed</th></tr></thead>\n<tbody>\n",
    );
    for row in rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(&row.ticker),
            escape(&row.contract_symbol),
            escape(&row.expiration_date),
            row.strike_price,
            row.option_type,
            decimal(row.bid, 2),
            decimal(row.ask, 2),
            decimal(row.last_price, 2),
            integer(row.volume),
            integer(row.open_interest),
            percent(row.implied_volatility),
            decimal(row.delta, 3),
            decimal(row.gamma, 4),
            decimal(row.theta, 3),
            decimal(row.vega, 3),
            decimal(row.underlying_price, 2),
            percent(row.strike_distance),
            escape(&row.observed_at),
        ));
    }
    html.push_str("</tbody>\n</table>\n");
    html
}

fn decimal(value: Option<f64>, places: usize) -> String {
    value.map_or_else(|| String::from("-"), |value| format!("{value:.places$}"))
}

fn integer(value: Option<i64>) -> String {
    value.map_or_else(|| String::from("-"), |value| value.to_string())
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| String::from("-"), |value| format!("{:.1}%", value * 100.0))
}

/// Linear map from `[lo, hi]` onto `[out_lo, out_hi]`; a flat domain maps to the midpoint.
fn scale(value: f64, lo: f64, hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    if hi - lo <= f64::EPSILON {
        return (out_lo + out_hi) / 2.0;
    }
    out_lo + (value - lo) / (hi - lo) * (out_hi - out_lo)
}

fn svg_open(label: &str) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {CHART_WIDTH} {CHART_HEIGHT}\" \
         role=\"img\" aria-label=\"{label}\" class=\"chart\">\n"
    )
}

/// Implied volatility against strike, sized by premium and colored by side.
pub fn scatter_svg(rows: &[ContractRow]) -> String {
    let points: Vec<(&ContractRow, f64)> = rows
        .iter()
        .filter_map(|row| row.implied_volatility.map(|iv| (row, iv)))
        .collect();
    if points.is_empty() {
        return String::from("<p class=\"notice\">No implied volatility data for these contracts.</p>\n");
    }

    let (strike_lo, strike_hi) = bounds(points.iter().map(|(row, _)| row.strike_price));
    let (_, iv_hi) = bounds(points.iter().map(|(_, iv)| *iv));
    let (_, premium_hi) = bounds(points.iter().map(|(row, _)| row.premium.unwrap_or(0.0)));
    let (left, right) = (MARGIN, CHART_WIDTH - MARGIN / 2.0);
    let (top, bottom) = (MARGIN / 2.0, CHART_HEIGHT - MARGIN);

    let mut svg = svg_open("Implied volatility versus strike price");
    svg.push_str(&axes(left, right, top, bottom));
    svg.push_str(&format!(
        "<text x=\"{left}\" y=\"{y}\" class=\"tick\">{strike_lo:.2}</text>\n\
         <text x=\"{right}\" y=\"{y}\" class=\"tick\" text-anchor=\"end\">{strike_hi:.2}</text>\n\
         <text x=\"{x}\" y=\"{bottom}\" class=\"tick\" text-anchor=\"end\">0%</text>\n\
         <text x=\"{x}\" y=\"{top_label}\" class=\"tick\" text-anchor=\"end\">{iv_top:.0}%</text>\n\
         <text x=\"{mid}\" y=\"{title_y}\" class=\"axis-title\" text-anchor=\"middle\">Strike price</text>\n",
        y = bottom + 16.0,
        x = left - 6.0,
        top_label = top + 4.0,
        iv_top = iv_hi * 100.0,
        mid = (left + right) / 2.0,
        title_y = CHART_HEIGHT - 8.0,
    ));

    for (row, iv) in &points {
        let cx = scale(row.strike_price, strike_lo, strike_hi, left, right);
        let cy = scale(*iv, 0.0, iv_hi, bottom, top);
        let premium = row.premium.unwrap_or(0.0);
        let radius = if premium_hi > 0.0 { 3.0 + 9.0 * premium / premium_hi } else { 3.0 };
        let color = match row.option_type {
            OptionKind::Call => CALL_COLOR,
            OptionKind::Put => PUT_COLOR,
        };
        svg.push_str(&format!(
            "<circle cx=\"{cx:.1}\" cy=\"{cy:.1}\" r=\"{radius:.1}\" fill=\"{color}\" fill-opacity=\"0.6\">\
             <title>{} {} {} strike {:.2} IV {:.1}% bid {}</title></circle>\n",
            escape(&row.contract_symbol),
            escape(&row.expiration_date),
            row.option_type,
            row.strike_price,
            iv * 100.0,
            decimal(row.premium, 2),
        ));
    }
    svg.push_str(&format!(
        "<circle cx=\"{lx}\" cy=\"{ly}\" r=\"5\" fill=\"{CALL_COLOR}\"/><text x=\"{tx}\" y=\"{ty}\" class=\"tick\">call</text>\n\
         <circle cx=\"{lx}\" cy=\"{ly2}\" r=\"5\" fill=\"{PUT_COLOR}\"/><text x=\"{tx}\" y=\"{ty2}\" class=\"tick\">put</text>\n",
        lx = right - 40.0,
        ly = top + 6.0,
        ly2 = top + 22.0,
        tx = right - 30.0,
        ty = top + 10.0,
        ty2 = top + 26.0,
    ));
    svg.push_str("</svg>\n");
    svg
}

/// Strike by expiration grid colored by the highest premium in each cell.
pub fn heatmap_svg(rows: &[ContractRow]) -> String {
    let mut cells: BTreeMap<(String, u64), f64> = BTreeMap::new();
    let mut strikes: Vec<f64> = Vec::new();
    for row in rows {
        let Some(premium) = row.premium else { continue };
        let key = (row.expiration_date.clone(), row.strike_price.to_bits());
        let cell = cells.entry(key).or_insert(premium);
        *cell = cell.max(premium);
        strikes.push(row.strike_price);
    }
    if cells.is_empty() {
        return String::from("<p class=\"notice\">No premium data for these contracts.</p>\n");
    }

    strikes.sort_by(f64::total_cmp);
    strikes.dedup();
    let mut expirations: Vec<&str> = cells.keys().map(|(expiration, _)| expiration.as_str()).collect();
    expirations.dedup();
    let (_, premium_hi) = bounds(cells.values().copied());

    let (left, right) = (MARGIN * 1.6, CHART_WIDTH - MARGIN / 2.0);
    let (top, bottom) = (MARGIN / 2.0, CHART_HEIGHT - MARGIN);
    let cell_width = (right - left) / strikes.len() as f64;
    let cell_height = (bottom - top) / expirations.len() as f64;
    let label_every = (strikes.len() / 12).max(1);

    let mut svg = svg_open("Premium heatmap by strike and expiration");
    for (row_index, expiration) in expirations.iter().enumerate() {
        let y = top + row_index as f64 * cell_height;
        svg.push_str(&format!(
            "<text x=\"{x}\" y=\"{ty:.1}\" class=\"tick\" text-anchor=\"end\">{}</text>\n",
            escape(expiration),
            x = left - 6.0,
            ty = y + cell_height / 2.0 + 4.0,
        ));
        for (column, strike) in strikes.iter().enumerate() {
            let Some(premium) = cells.get(&(expiration.to_string(), strike.to_bits())) else {
                continue;
            };
            let x = left + column as f64 * cell_width;
            svg.push_str(&format!(
                "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{w:.1}\" height=\"{h:.1}\" fill=\"{}\">\
                 <title>{} strike {:.2} bid {:.2}</title></rect>\n",
                heat_color(*premium / premium_hi.max(f64::EPSILON)),
                escape(expiration),
                strike,
                premium,
                w = cell_width,
                h = cell_height,
            ));
        }
    }
    for (column, strike) in strikes.iter().enumerate().step_by(label_every) {
        svg.push_str(&format!(
            "<text x=\"{x:.1}\" y=\"{y}\" class=\"tick\" text-anchor=\"middle\">{strike:.0}</text>\n",
            x = left + (column as f64 + 0.5) * cell_width,
            y = bottom + 16.0,
        ));
    }
    svg.push_str(&format!(
        "<text x=\"{x}\" y=\"{y}\" class=\"axis-title\" text-anchor=\"middle\">Strike price</text>\n</svg>\n",
        x = (left + right) / 2.0,
        y = CHART_HEIGHT - 8.0,
    ));
    svg
}

fn axes(left: f64, right: f64, top: f64, bottom: f64) -> String {
    format!(
        "<line x1=\"{left}\" y1=\"{bottom}\" x2=\"{right}\" y2=\"{bottom}\" class=\"axis\"/>\n\
         <line x1=\"{left}\" y1=\"{top}\" x2=\"{left}\" y2=\"{bottom}\" class=\"axis\"/>\n"
    )
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
        (lo.min(value), hi.max(value))
    })
}

/// Light-to-dark red ramp for `t` in `[0, 1]`.
fn heat_color(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    let channel = |from: f64, to: f64| (from + (to - from) * t).round() as u8;
    format!(
        "#{:02x}{:02x}{:02x}",
        channel(254.0, 165.0),
        channel(229.0, 15.0),
        channel(217.0, 21.0)
    )
}

const STYLE: &str = "<style>\n\
body{font-family:system-ui,sans-serif;margin:1.5rem;color:#222}\n\
h1{margin-bottom:.2rem}.lead{color:#555}\n\
.filters{display:flex;flex-wrap:wrap;gap:.6rem;align-items:end;margin:1rem 0}\n\
.filters label{display:flex;flex-direction:column;font-size:.8rem}\n\
.summary{display:flex;gap:2rem;margin:1rem 0}.summary span{display:block;font-size:.8rem;color:#666}\n\
table{border-collapse:collapse;font-size:.8rem;width:100%}\n\
th,td{border-bottom:1px solid #ddd;padding:.25rem .4rem;text-align:right}\n\
th:nth-child(-n+3),td:nth-child(-n+3){text-align:left}\n\
.chart{max-width:60rem;width:100%;height:auto}.axis{stroke:#888}\n\
.tick{font-size:10px;fill:#555}.axis-title{font-size:11px;fill:#333}\n\
.error{color:#b00020}.notice{color:#555;font-style:italic}\n\
footer{margin-top:2rem;font-size:.8rem;color:#777}\n\
</style>\n";
