//! Built-in report templates.

pub const TABLE: &str = r#"# Cost report

Grouped by: {{ group_by | join(sep=", ") }}
{% if warnings %}
> **Warning:** incomplete data
{% for w in warnings %}> - {{ w }}
{% endfor %}{% endif %}
| {% for d in group_by %}{{ d }} | {% endfor %}currency | amount | records | share |
|{% for d in group_by %}---|{% endfor %}---|---:|---:|---:|
{% for row in rows %}| {% for v in row.values %}{{ v }} | {% endfor %}{{ row.currency }} | {{ row.amount_display }} | {{ row.record_count }} | {{ row.share }}% |
{% endfor %}
## Totals

{% for t in totals %}- {{ t.currency }}: {{ t.amount_display }}
{% endfor %}
## Providers

{% for p in providers %}- {{ p.provider }}: {{ p.status }} ({{ p.records }} records{% if p.skipped > 0 %}, {{ p.skipped }} skipped{% endif %})
{% endfor %}"#;

pub const NARRATIVE: &str = r#"Cost summary for {{ record_count }} records, grouped by {{ group_by | join(sep=", ") }}.
{% for t in totals %}
Total spend in {{ t.currency }} was {{ t.amount_display }}.{% endfor %}
{% for row in rows %}
{{ row.label }} accounted for {{ row.amount_display }} {{ row.currency }} ({{ row.share }}% of {{ row.currency }} spend) across {{ row.record_count }} records.{% endfor %}
{% for p in providers %}
{{ p.provider }} data is {{ p.status }} ({{ p.records }} records{% if p.skipped > 0 %}, {{ p.skipped }} skipped{% endif %}).{% endfor %}
{% if degraded %}
Data is incomplete:{% for w in warnings %}
- {{ w }}{% endfor %}
{% endif %}"#;

pub const HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Cost report</title></head>
<body>
<h1>Cost report</h1>
{% if warnings %}<ul class="warnings">
{% for w in warnings %}  <li>{{ w }}</li>
{% endfor %}</ul>
{% endif %}<table>
  <tr>{% for d in group_by %}<th>{{ d }}</th>{% endfor %}<th>currency</th><th>amount</th><th>records</th><th>share</th></tr>
{% for row in rows %}  <tr>{% for v in row.values %}<td>{{ v }}</td>{% endfor %}<td>{{ row.currency }}</td><td>{{ row.amount_display }}</td><td>{{ row.record_count }}</td><td>{{ row.share }}%</td></tr>
{% endfor %}</table>
<h2>Totals</h2>
<ul>
{% for t in totals %}  <li>{{ t.currency }}: {{ t.amount_display }}</li>
{% endfor %}</ul>
<h2>Providers</h2>
<ul>
{% for p in providers %}  <li>{{ p.provider }}: {{ p.status }} ({{ p.records }} records)</li>
{% endfor %}</ul>
</body>
</html>
"#;

/// (name, source) pairs registered on every renderer.
pub fn builtin() -> [(&'static str, &'static str); 3] {
    [("table", TABLE), ("narrative", NARRATIVE), ("html", HTML)]
}
