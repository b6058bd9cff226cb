// Hand-maintained. Service 1 does not own DDL for this table (spec.md §6.3);
// this must match the externally-migrated `doc_text_extraction_queue` schema.

diesel::table! {
    doc_text_extraction_queue (extraction_id) {
        extraction_id -> BigInt,
        doc_id -> Text,
        doc_name -> Text,
        file_ext -> Text,
        source_uri -> Text,
        datalake_raw_uri -> Nullable<Text>,
        password -> Nullable<Text>,
        text_extraction_status -> Integer,
        number_of_pages -> Integer,
        is_processing -> Bool,
        processing_started_at -> Nullable<Timestamptz>,
        datalake_text_uri -> Nullable<Text>,
        text_extraction_duration_seconds -> Nullable<Integer>,
        last_error_message -> Nullable<Text>,
        error_message -> Nullable<Text>,
        last_processed_at -> Nullable<Timestamptz>,
        extracted_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
        is_active -> Bool,
    }
}
