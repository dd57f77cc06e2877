use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Weekday};
use rusqlite::Connection;

use rollcalld::api::error::ApiError;
use rollcalld::api::handlers::attendance::{
    record_attendance, student_history, AttendanceOutcome, AttendanceRequest,
};
use rollcalld::policy::{Band, WindowConfig};

fn mem_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    rollcalld::db::init_schema(&conn).expect("init schema");
    conn
}

fn windows() -> WindowConfig {
    WindowConfig {
        weekday: Weekday::Mon,
        check_in: band(18, 0, 20, 0),
        check_out: band(21, 30, 23, 30),
    }
}

fn band(sh: u32, sm: u32, eh: u32, em: u32) -> Band {
    Band {
        start: NaiveTime::from_hms_opt(sh, sm, 0).expect("valid time"),
        end: NaiveTime::from_hms_opt(eh, em, 0).expect("valid time"),
    }
}

// 2026-08-03 is a Monday; 08-04 a Tuesday.
fn at(day: u32, h: u32, m: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
        .expect("offset in range")
        .with_ymd_and_hms(2026, 8, day, h, m, 0)
        .single()
        .expect("valid instant")
}

fn seed_student(conn: &Connection, email: &str) {
    conn.execute(
        "INSERT INTO students(id, email, birth_date, created_at)
         VALUES(?, ?, '2000-01-01', '2026-08-03 18:00:00')",
        (&format!("sid-{email}"), &email),
    )
    .expect("seed student");
}

fn request(email: &str) -> AttendanceRequest {
    AttendanceRequest {
        identity_key: email.to_string(),
        rating: None,
        comment: None,
    }
}

#[test]
fn first_request_in_check_in_band_creates_an_open_record() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");

    let outcome = record_attendance(&conn, &windows(), at(3, 18, 30), &request("ana@x.com"))
        .expect("check-in");
    assert_eq!(outcome, AttendanceOutcome::CheckedIn);

    let (check_in, check_out): (String, Option<String>) = conn
        .query_row("SELECT check_in, check_out FROM attendance", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .expect("one record");
    assert_eq!(check_in, "2026-08-03 18:30:00");
    assert_eq!(check_out, None);
}

#[test]
fn second_check_in_attempt_same_day_conflicts() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");
    record_attendance(&conn, &windows(), at(3, 18, 30), &request("ana@x.com"))
        .expect("check-in");

    let err = record_attendance(&conn, &windows(), at(3, 18, 45), &request("ana@x.com"))
        .expect_err("second check-in must fail");
    assert!(matches!(err, ApiError::AlreadyCheckedIn(_)), "{err}");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))
        .expect("count");
    assert_eq!(count, 1, "at most one record per (student, date)");
}

#[test]
fn checkout_closes_the_record_with_feedback_and_later_stamp() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");
    record_attendance(&conn, &windows(), at(3, 18, 30), &request("ana@x.com"))
        .expect("check-in");

    let req = AttendanceRequest {
        identity_key: "ana@x.com".into(),
        rating: Some(5),
        comment: Some("great class".into()),
    };
    let outcome =
        record_attendance(&conn, &windows(), at(3, 22, 10), &req).expect("check-out");
    assert_eq!(outcome, AttendanceOutcome::CheckedOut);

    let (check_in, check_out, rating, comment): (String, String, i64, String) = conn
        .query_row(
            "SELECT check_in, check_out, rating, comment FROM attendance",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .expect("closed record");
    assert!(check_out > check_in, "{check_out} must be after {check_in}");
    assert_eq!(rating, 5);
    assert_eq!(comment, "great class");

    // The pair is closed: any further request that day is refused.
    let err = record_attendance(&conn, &windows(), at(3, 22, 20), &request("ana@x.com"))
        .expect_err("third request must fail");
    assert!(
        matches!(err, ApiError::AttendanceAlreadyComplete(_)),
        "{err}"
    );
    let err = record_attendance(&conn, &windows(), at(3, 18, 40), &request("ana@x.com"))
        .expect_err("next-band request must fail too");
    assert!(
        matches!(err, ApiError::AttendanceAlreadyComplete(_)),
        "{err}"
    );
}

#[test]
fn wrong_weekday_is_rejected_regardless_of_time() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");
    for (h, m) in [(8, 0), (18, 30), (22, 10)] {
        let err = record_attendance(&conn, &windows(), at(4, h, m), &request("ana@x.com"))
            .expect_err("Tuesday must fail");
        assert!(matches!(err, ApiError::OutsideWindow(_)), "{err}");
    }
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))
        .expect("count");
    assert_eq!(count, 0);
}

#[test]
fn gap_between_bands_is_rejected_with_explicit_error() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");
    let err = record_attendance(&conn, &windows(), at(3, 20, 30), &request("ana@x.com"))
        .expect_err("between bands must fail");
    assert!(matches!(err, ApiError::OutsideWindow(_)), "{err}");
}

#[test]
fn checkout_band_without_a_check_in_has_nothing_to_close() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");
    let err = record_attendance(&conn, &windows(), at(3, 22, 0), &request("ana@x.com"))
        .expect_err("no open record to check out");
    assert!(matches!(err, ApiError::NotFound(_)), "{err}");
}

#[test]
fn unknown_student_cannot_register_attendance() {
    let conn = mem_db();
    let err = record_attendance(&conn, &windows(), at(3, 18, 30), &request("ghost@x.com"))
        .expect_err("unknown student must fail");
    assert!(matches!(err, ApiError::NotFound(_)), "{err}");
}

#[test]
fn rating_outside_scale_is_rejected() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");
    for rating in [0, 6, -1] {
        let req = AttendanceRequest {
            identity_key: "ana@x.com".into(),
            rating: Some(rating),
            comment: None,
        };
        let err = record_attendance(&conn, &windows(), at(3, 18, 30), &req)
            .expect_err("out-of-scale rating must fail");
        assert!(matches!(err, ApiError::Validation(_)), "{err}");
    }
}

#[test]
fn store_constraint_keeps_rival_inserts_to_one_row() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");

    // Two rivals that both observed "no record yet" and insert blindly:
    // the second lands on the unique (student, date) slot and is dropped.
    let insert = "INSERT INTO attendance(id, student_id, date, check_in)
                  VALUES(?, 'sid-ana@x.com', '2026-08-03', '2026-08-03 18:30:00')
                  ON CONFLICT(student_id, date) DO NOTHING";
    let first = conn.execute(insert, ["r1"]).expect("first insert");
    let second = conn.execute(insert, ["r2"]).expect("second insert");
    assert_eq!(first, 1);
    assert_eq!(second, 0, "rival insert must be dropped, not duplicated");
}

#[test]
fn rival_checkout_loses_the_conditional_update() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");
    record_attendance(&conn, &windows(), at(3, 18, 30), &request("ana@x.com"))
        .expect("check-in");
    // A rival closed the record between our read and our write.
    conn.execute(
        "UPDATE attendance SET check_out = '2026-08-03 21:31:00'",
        [],
    )
    .expect("rival close");

    let updated = conn
        .execute(
            "UPDATE attendance SET check_out = '2026-08-03 21:32:00'
             WHERE check_out IS NULL",
            [],
        )
        .expect("conditional update");
    assert_eq!(updated, 0, "losing rival must not overwrite the close");
}

#[test]
fn history_lists_newest_first_and_reads_empty_for_unknown_keys() {
    let conn = mem_db();
    seed_student(&conn, "ana@x.com");
    for (day, date) in [(3, "2026-08-03"), (10, "2026-08-10")] {
        conn.execute(
            "INSERT INTO attendance(id, student_id, date, check_in)
             VALUES(?, 'sid-ana@x.com', ?, ?)",
            (
                &format!("r{day}"),
                &date,
                &format!("{date} 18:30:00"),
            ),
        )
        .expect("insert history row");
    }

    let rows = student_history(&conn, "Ana@X.com").expect("history");
    assert_eq!(rows.len(), 2);
    assert!(rows[0].date > rows[1].date, "newest first");

    let empty = student_history(&conn, "ghost@x.com").expect("unknown key");
    assert!(empty.is_empty());
}
