use rusqlite::Connection;
use std::path::Path;

/// Storage format for check-in/check-out stamps.
pub const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            name TEXT,
            birth_date TEXT NOT NULL,
            cohort TEXT,
            national_id TEXT,
            avatar TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_email ON students(email)",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_national_id
         ON students(national_id) WHERE national_id IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_cohort ON students(cohort)",
        [],
    )?;

    // Databases created before the profile screen shipped lack the
    // avatar and national_id columns. Add them if needed.
    ensure_students_profile_columns(conn)?;

    // UNIQUE(student_id, date) is the store-level guard against two
    // concurrent first check-ins inserting twice for the same day.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            check_in TEXT NOT NULL,
            check_out TEXT,
            rating INTEGER,
            comment TEXT,
            UNIQUE(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    ensure_attendance_feedback_columns(conn)?;

    Ok(())
}

fn ensure_students_profile_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "national_id")? {
        conn.execute("ALTER TABLE students ADD COLUMN national_id TEXT", [])?;
    }
    if !table_has_column(conn, "students", "avatar")? {
        conn.execute("ALTER TABLE students ADD COLUMN avatar TEXT", [])?;
    }
    Ok(())
}

fn ensure_attendance_feedback_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "attendance", "rating")? {
        conn.execute("ALTER TABLE attendance ADD COLUMN rating INTEGER", [])?;
    }
    if !table_has_column(conn, "attendance", "comment")? {
        conn.execute("ALTER TABLE attendance ADD COLUMN comment TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
