//! Default prompt templates
//!
//! Placeholders are substituted with [`render`]: `{chunk}` (alias
//! `{log_chunk}`), `{analyses}`, `{database_data}` and `{current_time}`.

use chrono::Utc;

/// Marker the model returns for a chunk without findings
pub const NONE_SENTINEL: &str = "<NONE>";

pub const CHUNK_SYSTEM: &str =
    "You are an expert log analyst who identifies and explains system errors.";

pub const CHUNK_PROMPT: &str = "Analyze the following log excerpt and identify every error, exception and warning in it.
If the excerpt contains no errors, reply with exactly \"<NONE>\".
Otherwise describe each problem: error type, severity, affected component and the relevant log lines.

Log excerpt:
{chunk}
";

pub const SUMMARY_SYSTEM: &str = "You are an operations analyst who consolidates findings from many sources into one actionable report.";

pub const SUMMARY_PROMPT: &str = "Merge the following per-excerpt error analyses into one complete report.
The report must contain: error categories, a timeline breakdown, a per-application breakdown, correlations between errors, and remediation suggestions.

Analyses:
{analyses}
";

pub const DATABASE_SYSTEM: &str = "You are a senior database operations engineer. \
Your report must give the reader a complete picture of the instance (identity, data distribution, business meaning, key configuration), \
contain concrete configuration changes (parameter, current value, suggested value, reason), \
and be clearly structured: top-level sections numbered I to VI, items numbered 1. 2. 3. \
Write one sentence per line. Quantify risk as Critical/High/Medium/Low. Write 'no data' when a dataset is empty.";

pub const DATABASE_PROMPT: &str = "# Database operations analysis

Using the collected database statistics below, write a detailed, actionable operations report.

## Collected data

```json
{database_data}
```

## Requirements

1. First describe the instance itself, then the data inside it, and only then findings and recommendations.
2. Configuration recommendations must name the parameter, its current value, the suggested value, the reason and how to apply it.
3. Write every sentence on its own line and every list item on its own line.

## Output structure (keep this order)

### I. Instance overview

1. Identity: database type and version, address and port, role.
2. Connections and resources: current and maximum connections, key settings from `variables`.
3. Object inventory: number of databases, schemas, tables and indexes.
4. Capacity: total size, per-database size and share, largest and smallest database.
5. Summary: two or three sentences on purpose, scale and health.

---

### II. Data inventory

1. Distribution per database: size, share and table count, largest tables.
2. Table and index characteristics: very large or empty tables, index distribution.
3. Business meaning inferred from database and table names.
4. Completeness: which datasets were collected and which are missing.

---

### III. Findings

#### 3.1 Key findings

Numbered findings with a risk level each.

#### 3.2 Capacity analysis

#### 3.3 Performance analysis

Connections, transactions and rollback rate, slow queries, cache hit ratio, I/O pressure.

---

### IV. Risks

Numbered risks with level and impact, or \"1. None\".

---

### V. Operational recommendations

Numbered, each stating what to do, how, and the expected outcome.

---

### VI. Configuration recommendations

Numbered, each with parameter, current value, suggested value, reason and how to apply it.

---

**Analysis time**: {current_time}
";

/// Substitutes `(placeholder, value)` pairs and `{current_time}`
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let mut rendered = template.replace("{current_time}", &now);
    for (placeholder, value) in values {
        rendered = rendered.replace(placeholder, value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let rendered = render("{a} and {a} at {current_time}", &[("{a}", "x")]);
        assert!(rendered.starts_with("x and x at "));
        assert!(rendered.ends_with("UTC"));
    }

    #[test]
    fn test_chunk_prompt_mentions_sentinel() {
        assert!(CHUNK_PROMPT.contains(NONE_SENTINEL));
        assert!(CHUNK_PROMPT.contains("{chunk}"));
        assert!(SUMMARY_PROMPT.contains("{analyses}"));
        assert!(DATABASE_PROMPT.contains("{database_data}"));
    }
}
