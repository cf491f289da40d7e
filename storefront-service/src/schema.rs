diesel::table! {
    cards (id) {
        id -> Uuid,
        card_name -> Varchar,
        set_name -> Nullable<Varchar>,
        card_number -> Nullable<Varchar>,
        year -> Nullable<Int4>,
        sport_type -> Nullable<Varchar>,
        condition -> Nullable<Varchar>,
        price_nzd -> Nullable<Numeric>,
        quantity -> Int4,
        description -> Nullable<Text>,
        player_name -> Nullable<Varchar>,
        rarity -> Nullable<Varchar>,
        graded -> Bool,
        grade_company -> Nullable<Varchar>,
        grade_value -> Nullable<Varchar>,
        available -> Bool,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    figurines (id) {
        id -> Uuid,
        product_name -> Varchar,
        description -> Nullable<Text>,
        price_nzd -> Numeric,
        quantity -> Int4,
        available -> Bool,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    cart (id) {
        id -> Uuid,
        user_id -> Uuid,
        card_id -> Nullable<Uuid>,
        figurine_id -> Nullable<Uuid>,
        quantity -> Int4,
        added_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    coupons (id) {
        id -> Uuid,
        code -> Varchar,
        discount_type -> Varchar,
        discount_value -> Numeric,
        min_purchase_amount -> Nullable<Numeric>,
        max_discount_amount -> Nullable<Numeric>,
        usage_limit -> Nullable<Int4>,
        used_count -> Int4,
        valid_from -> Nullable<Timestamptz>,
        valid_until -> Nullable<Timestamptz>,
        active -> Bool,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Uuid,
        order_number -> Varchar,
        subtotal_nzd -> Numeric,
        discount_amount -> Numeric,
        total_nzd -> Numeric,
        customer_name -> Varchar,
        customer_email -> Varchar,
        shipping_address -> Text,
        notes -> Nullable<Text>,
        coupon_id -> Nullable<Uuid>,
        status -> Varchar,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    order_items (id) {
        id -> Uuid,
        order_id -> Uuid,
        card_id -> Nullable<Uuid>,
        figurine_id -> Nullable<Uuid>,
        quantity -> Int4,
        price_nzd -> Numeric,
    }
}

diesel::table! {
    coupon_usage (id) {
        id -> Uuid,
        coupon_id -> Uuid,
        user_id -> Uuid,
        order_id -> Uuid,
        discount_amount -> Numeric,
        used_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    csv_imports (id) {
        id -> Uuid,
        user_id -> Uuid,
        filename -> Varchar,
        total_rows -> Int4,
        successful_rows -> Int4,
        failed_rows -> Int4,
        duplicates_skipped -> Int4,
        status -> Varchar,
        error_log -> Jsonb,
        created_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    email_queue (id) {
        id -> Uuid,
        recipient_email -> Varchar,
        subject -> Varchar,
        body -> Text,
        template_name -> Nullable<Varchar>,
        template_data -> Nullable<Jsonb>,
        sent -> Bool,
        created_at -> Nullable<Timestamptz>,
        sent_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(cart -> cards (card_id));
diesel::joinable!(cart -> figurines (figurine_id));
diesel::joinable!(order_items -> orders (order_id));
diesel::joinable!(order_items -> cards (card_id));
diesel::joinable!(order_items -> figurines (figurine_id));
diesel::joinable!(coupon_usage -> coupons (coupon_id));
diesel::joinable!(orders -> coupons (coupon_id));

diesel::allow_tables_to_appear_in_same_query!(
    cards,
    figurines,
    cart,
    coupons,
    orders,
    order_items,
    coupon_usage,
    csv_imports,
    email_queue,
);
