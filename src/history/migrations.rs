pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS score_points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id TEXT NOT NULL,
    offer_id TEXT NOT NULL,
    university TEXT NOT NULL,
    city TEXT NOT NULL,
    uf TEXT NOT NULL,
    course_name TEXT NOT NULL,
    date TEXT NOT NULL,
    score REAL,
    source TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    UNIQUE(course_id, offer_id, date, source)
);
CREATE INDEX IF NOT EXISTS idx_score_points_course_source_date
    ON score_points(course_id, source, date);
"#;
