pub mod postgres;
pub mod supabase;
