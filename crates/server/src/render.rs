//! HTML and CSV rendering for scan and analysis records

use engine::{SymbolAnalysis, SymbolResult};
use rust_decimal::Decimal;

/// Response format of the one-shot endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Html,
    Csv,
}

impl OutputFormat {
    /// Explicit `format` wins; otherwise a browser (`text/html` without
    /// `application/json` in Accept) gets HTML.
    pub fn resolve(format: Option<&str>, accept: &str) -> Self {
        match format.map(|f| f.to_ascii_lowercase()) {
            Some(f) if f == "html" => OutputFormat::Html,
            Some(f) if f == "csv" => OutputFormat::Csv,
            Some(_) => OutputFormat::Json,
            None if accept.contains("text/html") && !accept.contains("application/json") => {
                OutputFormat::Html
            }
            None => OutputFormat::Json,
        }
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

/// Two decimals, or `-` when absent
fn fmt_num(value: Option<Decimal>) -> String {
    match value {
        Some(v) => format!("{:.2}", v.round_dp(2)),
        None => "-".to_string(),
    }
}

fn sign_class(value: Option<Decimal>) -> &'static str {
    match value {
        Some(v) if v >= Decimal::ZERO => "positive",
        Some(_) => "negative",
        None => "",
    }
}

// ============================================================================
// Pages
// ============================================================================

const BASE_STYLE: &str = "body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 20px; background: #f4f4f9; color: #333; }
h1, h2 { color: #2c3e50; }
table { border-collapse: collapse; width: 100%; background: white; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
th, td { border: 1px solid #ddd; padding: 8px 10px; text-align: left; font-size: 14px; }
th { background-color: #f8f9fa; font-weight: 600; }
tr:nth-child(even) { background-color: #f9f9f9; }
.positive { color: #27ae60; }
.negative { color: #c0392b; }
.rec-strong { color: green; font-weight: bold; }
.rec-avoid { color: red; }";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{}\n</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        BASE_STYLE,
        body
    )
}

/// Landing page listing `(path, description)` endpoints
pub fn home_page(version: &str, endpoints: &[(&str, &str)]) -> String {
    let mut body = format!(
        "<h1>NSE Quant Tool API</h1>\n<p>Version {}</p>\n<table>\n<thead><tr><th>Endpoint</th><th>Description</th></tr></thead>\n<tbody>\n",
        escape_html(version)
    );
    for (path, description) in endpoints {
        body.push_str(&format!(
            "<tr><td><a href=\"{0}\">{0}</a></td><td>{1}</td></tr>\n",
            escape_html(path),
            escape_html(description)
        ));
    }
    body.push_str("</tbody>\n</table>");
    page("NSE Quant Tool API", &body)
}

/// Plain message page (unknown index and the like)
pub fn message_page(message: &str) -> String {
    page("NSE Quant", &format!("<p>{}</p>", escape_html(message)))
}

pub fn scan_table(index: &str, results: &[SymbolResult]) -> String {
    let mut body = format!(
        "<h2>Scan Results for {}</h2>\n<table>\n<thead><tr><th>Symbol</th><th>Last Price</th><th>Momentum Return</th><th>Mean Rev Return</th></tr></thead>\n<tbody>\n",
        escape_html(index)
    );
    for r in results {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td class=\"{}\">{}</td></tr>\n",
            escape_html(&r.symbol),
            fmt_num(r.last_price),
            sign_class(r.momentum_return),
            fmt_num(r.momentum_return),
            sign_class(r.mean_rev_return),
            fmt_num(r.mean_rev_return),
        ));
    }
    body.push_str("</tbody>\n</table>");
    page(&format!("Scan Results - {}", index), &body)
}

pub fn analysis_table(title: &str, results: &[SymbolAnalysis]) -> String {
    let mut body = format!(
        "<h2>{}</h2>\n<table>\n<thead><tr><th>Symbol</th><th>Price</th><th>Recommendation</th><th>Mom Signal</th><th>Mom Return %</th><th>Mom Sharpe</th><th>Rev Signal</th><th>Rev Return %</th><th>Rev Win Rate %</th></tr></thead>\n<tbody>\n",
        escape_html(title)
    );
    for r in results {
        let label = r.recommendation.label();
        let rec_class = if label.contains("Strong") {
            "rec-strong"
        } else if label.contains("Avoid") {
            "rec-avoid"
        } else {
            ""
        };
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{:?}</td><td>{}</td><td>{}</td><td>{:?}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&r.symbol),
            fmt_num(r.last_price),
            rec_class,
            label,
            r.momentum.signal,
            fmt_num(r.momentum.metrics.return_pct),
            fmt_num(r.momentum.metrics.sharpe),
            r.mean_reversion.signal,
            fmt_num(r.mean_reversion.metrics.return_pct),
            fmt_num(r.mean_reversion.metrics.win_rate_pct),
        ));
    }
    body.push_str("</tbody>\n</table>");
    page(title, &body)
}

/// Interactive scan page: starts a background scan and polls its progress
pub fn scan_page(default_live: bool) -> String {
    SCAN_PAGE.replace(
        "__DEFAULT_LIVE__",
        if default_live { "true" } else { "false" },
    )
}

const SCAN_PAGE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>NSE Scan</title>
<style>
body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; padding: 20px; background: #f4f4f9; color: #333; }
.controls { margin-bottom: 20px; background: white; padding: 15px; border-radius: 8px; display: flex; align-items: center; gap: 15px; flex-wrap: wrap; }
select, button, input { padding: 8px 12px; border: 1px solid #ddd; border-radius: 4px; font-size: 14px; }
button { background: #3498db; color: white; border: none; cursor: pointer; }
table { border-collapse: collapse; width: 100%; background: white; }
th, td { border-bottom: 1px solid #eee; padding: 10px 12px; text-align: left; }
th { background: #f8f9fa; cursor: pointer; }
#progressInfo { color: #666; font-style: italic; margin-left: auto; }
.positive { color: #27ae60; }
.negative { color: #c0392b; }
</style>
</head>
<body>
<h2>NSE Scan</h2>
<div class="controls">
  <label>Index: <select id="indexSelect"></select></label>
  <label><input type="checkbox" id="liveCheck"> Live (intraday)</label>
  <label>Min Return %: <input type="number" id="minReturnInput" style="width: 70px"></label>
  <button id="startBtn">Start Scan</button>
  <button id="exportBtn">Export CSV</button>
  <span id="progressInfo"></span>
</div>
<table id="resultsTable">
  <thead><tr>
    <th data-col="0">Symbol</th><th data-col="1">Last Price (INR)</th>
    <th data-col="2">Momentum Return (%)</th><th data-col="3">Mean Reversion Return (%)</th>
  </tr></thead>
  <tbody></tbody>
</table>
<script>
(function() {
  const DEFAULT_LIVE = __DEFAULT_LIVE__;
  const select = document.getElementById('indexSelect');
  const progress = document.getElementById('progressInfo');
  const tbody = document.querySelector('#resultsTable tbody');
  let rows = [];
  let timer = null;

  function fmt(v) { return v === null || v === undefined ? '-' : Number(v).toFixed(2); }
  function cls(v) { return v === null || v === undefined ? '' : (v >= 0 ? 'positive' : 'negative'); }
  function esc(s) { const d = document.createElement('div'); d.textContent = s; return d.innerHTML; }

  function render() {
    const min = document.getElementById('minReturnInput').value;
    const shown = rows.filter(r => min === '' ||
      (r.momentum_return !== null && r.momentum_return >= Number(min)) ||
      (r.mean_rev_return !== null && r.mean_rev_return >= Number(min)));
    tbody.innerHTML = shown.map(r => '<tr><td>' + esc(r.symbol) + '</td><td data-value="' + (r.last_price ?? '') + '">' + fmt(r.last_price) +
      '</td><td data-value="' + (r.momentum_return ?? '') + '" class="' + cls(r.momentum_return) + '">' + fmt(r.momentum_return) +
      '</td><td data-value="' + (r.mean_rev_return ?? '') + '" class="' + cls(r.mean_rev_return) + '">' + fmt(r.mean_rev_return) + '</td></tr>').join('');
  }

  async function poll() {
    const index = encodeURIComponent(select.value);
    const status = await (await fetch('/api/scan-status?index=' + index)).json();
    const results = await (await fetch('/api/scan-results?index=' + index)).json();
    rows = results.results || [];
    render();
    progress.textContent = (status.running ? 'Scanning ' : 'Done ') + status.progress + '/' + status.total +
      (status.last_updated ? ' (updated ' + status.last_updated + ')' : '');
    if (!status.running && timer) { clearInterval(timer); timer = null; }
  }

  async function start() {
    const live = document.getElementById('liveCheck').checked ? 1 : 0;
    const res = await fetch('/api/scan-start?index=' + encodeURIComponent(select.value) + '&live=' + live);
    const body = await res.json();
    if (!res.ok) { progress.textContent = 'Unknown index'; return; }
    if (!body.started) { progress.textContent = body.message || 'Scan already running'; }
    if (!timer) { timer = setInterval(poll, 1000); }
    poll();
  }

  function exportCSV() {
    const lines = Array.from(document.querySelectorAll('#resultsTable tr')).map(tr =>
      Array.from(tr.cells).map(c => '"' + c.textContent.replace(/"/g, '""') + '"').join(','));
    const blob = new Blob([lines.join('\n')], { type: 'text/csv' });
    const a = document.createElement('a');
    a.href = URL.createObjectURL(blob); a.download = 'scan.csv'; a.click(); URL.revokeObjectURL(a.href);
  }

  document.querySelectorAll('#resultsTable th').forEach(th => th.addEventListener('click', () => {
    const col = Number(th.dataset.col);
    const asc = th.dataset.order !== 'asc';
    th.dataset.order = asc ? 'asc' : 'desc';
    const trs = Array.from(tbody.rows);
    trs.sort((a, b) => {
      const av = parseFloat(a.cells[col].dataset.value), bv = parseFloat(b.cells[col].dataset.value);
      if (!isNaN(av) && !isNaN(bv)) { return asc ? av - bv : bv - av; }
      return asc ? a.cells[col].textContent.localeCompare(b.cells[col].textContent)
                 : b.cells[col].textContent.localeCompare(a.cells[col].textContent);
    });
    trs.forEach(tr => tbody.appendChild(tr));
  }));

  document.getElementById('liveCheck').checked = DEFAULT_LIVE;
  document.getElementById('startBtn').addEventListener('click', start);
  document.getElementById('exportBtn').addEventListener('click', exportCSV);
  document.getElementById('minReturnInput').addEventListener('input', render);
  select.addEventListener('change', poll);

  fetch('/api/indexes').then(r => r.json()).then(indexes => {
    Object.keys(indexes).forEach(name => {
      const opt = document.createElement('option');
      opt.value = name; opt.textContent = name + ' (' + indexes[name].length + ')';
      select.appendChild(opt);
    });
    if (select.options.length) { poll(); }
  }).catch(() => { progress.textContent = 'Error loading indexes'; });
})();
</script>
</body>
</html>
"#;

// ============================================================================
// CSV
// ============================================================================

fn csv_num(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Scan records as CSV; absent numbers are empty cells
pub fn scan_csv(results: &[SymbolResult]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["symbol", "last_price", "momentum_return", "mean_rev_return"])?;
    for r in results {
        writer.write_record([
            r.symbol.clone(),
            csv_num(r.last_price),
            csv_num(r.momentum_return),
            csv_num(r.mean_rev_return),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(symbol: &str, price: Decimal, momentum: Decimal) -> SymbolResult {
        SymbolResult {
            symbol: symbol.to_string(),
            last_price: Some(price),
            momentum_return: Some(momentum),
            mean_rev_return: None,
        }
    }

    #[test]
    fn test_output_format_resolution() {
        let browser = "text/html,application/xhtml+xml,*/*;q=0.8";
        assert_eq!(OutputFormat::resolve(None, browser), OutputFormat::Html);
        assert_eq!(OutputFormat::resolve(None, "application/json"), OutputFormat::Json);
        assert_eq!(
            OutputFormat::resolve(None, "text/html, application/json"),
            OutputFormat::Json
        );
        assert_eq!(OutputFormat::resolve(None, ""), OutputFormat::Json);
        assert_eq!(OutputFormat::resolve(Some("CSV"), browser), OutputFormat::Csv);
        assert_eq!(OutputFormat::resolve(Some("json"), browser), OutputFormat::Json);
        assert_eq!(OutputFormat::resolve(Some("xml"), ""), OutputFormat::Json);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>M&M's \"x\"</b>"),
            "&lt;b&gt;M&amp;M&#39;s &quot;x&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_scan_table_formats_numbers() {
        let html = scan_table(
            "NIFTY IT",
            &[
                row("TCS.NS", dec!(3740.256), dec!(-1.5)),
                SymbolResult::degraded("<X>"),
            ],
        );
        assert!(html.contains("Scan Results for NIFTY IT"));
        assert!(html.contains("<td>3740.26</td>"));
        assert!(html.contains("class=\"negative\">-1.50</td>"));
        assert!(html.contains("<td>&lt;X&gt;</td><td>-</td>"));
    }

    #[test]
    fn test_scan_page_default_mode() {
        assert!(scan_page(true).contains("const DEFAULT_LIVE = true;"));
        assert!(scan_page(false).contains("const DEFAULT_LIVE = false;"));
        assert!(!scan_page(false).contains("__DEFAULT_LIVE__"));
    }

    #[test]
    fn test_scan_csv() {
        let csv = scan_csv(&[row("TCS.NS", dec!(100), dec!(2.5)), SymbolResult::degraded("B")])
            .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "symbol,last_price,momentum_return,mean_rev_return",
                "TCS.NS,100,2.5,",
                "B,,,",
            ]
        );
    }
}
