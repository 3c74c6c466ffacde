diesel::table! {
    newsletters (id) {
        id -> Uuid,
        email -> Varchar,
        subdomain -> Nullable<Varchar>,
        name -> Nullable<Varchar>,
        source -> Nullable<Varchar>,
        is_active -> Bool,
        verified_at -> Nullable<Timestamptz>,
        verification_token -> Nullable<Varchar>,
        metadata -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    support_tickets (id) {
        id -> Uuid,
        ticket_id -> Varchar,
        subdomain -> Nullable<Varchar>,
        #[sql_name = "type"]
        type_ -> Varchar,
        name -> Varchar,
        email -> Varchar,
        subject -> Varchar,
        message -> Text,
        priority -> Varchar,
        status -> Varchar,
        category -> Nullable<Varchar>,
        browser -> Nullable<Varchar>,
        os -> Nullable<Varchar>,
        url -> Nullable<Varchar>,
        attachments -> Nullable<Jsonb>,
        metadata -> Nullable<Jsonb>,
        resolved_at -> Nullable<Timestamptz>,
        company -> Nullable<Varchar>,
        receive_newsletter -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(newsletters, support_tickets);
