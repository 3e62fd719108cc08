/// Current UTC wall-clock time as Unix milliseconds.
///
/// Every timestamp that crosses the wire (events, messages, read marks)
/// comes from this one read, so server and client ordering agree.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
