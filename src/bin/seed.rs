use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_food_ordering_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "Admin", "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "Test User", "user@example.com", "user123", "user").await?;
    seed_foods(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    // Promote an existing account to the requested role, or create fresh.
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(row.0)
}

async fn seed_foods(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let foods = vec![
        ("Margherita Pizza", "Classic tomato and mozzarella", 29900_i64, "pizza"),
        ("Paneer Tikka", "Char-grilled paneer skewers", 24900, "starters"),
        ("Veg Biryani", "Fragrant basmati rice with vegetables", 19900, "mains"),
        ("Gulab Jamun", "Two pieces, served warm", 9900, "desserts"),
        ("Masala Chai", "Spiced milk tea", 4900, "drinks"),
    ];

    for (name, desc, price, category) in foods {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM foods WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        if exists.is_some() {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO foods (id, name, description, price, category)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(category)
        .execute(pool)
        .await?;
    }

    println!("Seeded foods");
    Ok(())
}
