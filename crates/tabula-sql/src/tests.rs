use super::*;
use tabula_schema::ForeignKeyField;

fn users() -> Table {
    let mut t = Table::new("app.users");
    t.fields.push(Field::new("id", "integer", false).identity());
    t.fields.push(Field::new("email", "varchar(200)", false));
    t.fields.push(Field::new("bio", "text", true));
    t.seq_field = Some("id".into());
    t.seq_name = Some("app.sq_1_id".into());
    t.trigger_name = Some("app.sqt_1_id".into());
    t
}

fn plain_key() -> Key {
    Key {
        name: "ix_1_2".into(),
        kind: KeyKind::Plain,
        fields: vec!["email".into(), "id".into()],
    }
}

#[test]
fn test_create_table_postgres() {
    let sql = Postgres.create_table(&users());
    assert_eq!(
        sql,
        "CREATE TABLE \"app\".\"users\" (\n  \"id\" integer GENERATED BY DEFAULT AS IDENTITY NOT NULL,\n  \"email\" varchar(200) NOT NULL,\n  \"bio\" text NULL)"
    );
}

#[test]
fn test_add_field_is_nullable() {
    let t = users();
    insta::assert_snapshot!(Postgres.add_field(&t, &t.fields[1]), @r#"ALTER TABLE "app"."users" ADD "email" varchar(200) NULL"#);
    insta::assert_snapshot!(SqlServer.add_field(&t, &t.fields[0]), @"ALTER TABLE [app].[users] ADD [id] integer IDENTITY NOT NULL");
    insta::assert_snapshot!(Oracle.add_field(&t, &t.fields[1]), @"ALTER TABLE app.users ADD (email varchar(200) NULL)");
}

#[test]
fn test_nullability_postgres() {
    let t = users();
    insta::assert_snapshot!(Postgres.set_field_nullability(&t, &t.fields[1]), @r#"ALTER TABLE "app"."users" ALTER COLUMN "email" SET NOT NULL"#);
    insta::assert_snapshot!(Postgres.set_field_null(&t, &t.fields[1]), @r#"ALTER TABLE "app"."users" ALTER COLUMN "email" DROP NOT NULL"#);
    insta::assert_snapshot!(SqlServer.set_field_null(&t, &t.fields[1]), @"ALTER TABLE [app].[users] ALTER COLUMN [email] varchar(200) NULL");
}

#[test]
fn test_keys() {
    let pk = Key {
        name: "pk_1_2".into(),
        kind: KeyKind::Primary,
        fields: vec!["id".into()],
    };
    insta::assert_snapshot!(Postgres.add_key("app.users", &pk), @r#"ALTER TABLE "app"."users" ADD CONSTRAINT "pk_1_2" PRIMARY KEY ("id")"#);
    insta::assert_snapshot!(Postgres.drop_key("app.users", &pk), @r#"ALTER TABLE "app"."users" DROP CONSTRAINT "pk_1_2""#);
    insta::assert_snapshot!(Postgres.add_key("app.users", &plain_key()), @r#"CREATE INDEX "app"."ix_1_2" ON "app"."users" ("email", "id")"#);
    insta::assert_snapshot!(Postgres.drop_key("app.users", &plain_key()), @r#"DROP INDEX "app"."ix_1_2""#);
    insta::assert_snapshot!(SqlServer.drop_key("app.users", &plain_key()), @"DROP INDEX [app].[users].[ix_1_2]");
}

#[test]
fn test_foreign_key() {
    let fk = ForeignKey {
        name: "fk_1_2".into(),
        target: "app.users".into(),
        fields: vec![ForeignKeyField {
            local: "author_id".into(),
            remote: "id".into(),
        }],
        cascade: true,
    };
    insta::assert_snapshot!(
        Postgres.add_foreign_key("app.posts", &fk),
        @r#"ALTER TABLE "app"."posts" ADD CONSTRAINT "fk_1_2" FOREIGN KEY ("author_id") REFERENCES "app"."users" ("id") ON DELETE CASCADE"#
    );
}

#[test]
fn test_rename() {
    insta::assert_snapshot!(Postgres.rename_table("order", "orders"), @r#"ALTER TABLE "order" RENAME TO "orders""#);
    insta::assert_snapshot!(Postgres.rename_table("app.order", "app.orders"), @r#"ALTER TABLE "app"."order" RENAME TO "orders""#);
    insta::assert_snapshot!(SqlServer.rename_table("app.order", "app.orders"), @"EXEC sp_rename '[app].[order]', 'orders'");
}

#[test]
fn test_procs() {
    let mut proc = Proc::new("app.touch");
    assert_eq!(Postgres.create_proc(&proc), None);
    assert_eq!(Postgres.drop_proc(&proc), None);

    proc.body = Some("() AS $$ SELECT 1 $$ LANGUAGE sql".into());
    insta::assert_snapshot!(Postgres.create_proc(&proc).unwrap(), @r#"CREATE OR REPLACE PROCEDURE "app"."touch" () AS $$ SELECT 1 $$ LANGUAGE sql"#);
    insta::assert_snapshot!(SqlServer.create_proc(&proc).unwrap(), @"CREATE PROCEDURE [app].[touch] () AS $$ SELECT 1 $$ LANGUAGE sql");
    insta::assert_snapshot!(Postgres.execute_proc(&proc), @r#"CALL "app"."touch"()"#);
    insta::assert_snapshot!(SqlServer.execute_proc(&proc), @"EXEC [app].[touch]");
}

#[test]
fn test_oracle_trigger() {
    let sql = Oracle.create_trigger(&users()).unwrap();
    assert!(sql.starts_with("CREATE OR REPLACE TRIGGER app.sqt_1_id\n  BEFORE INSERT ON app.users"));
    assert!(sql.contains("SELECT app.sq_1_id.NEXTVAL"));
    assert_eq!(Oracle.drop_trigger("app.sqt_1_id").as_deref(), Some("DROP TRIGGER app.sqt_1_id"));
    assert_eq!(Postgres.create_trigger(&users()), None);
}

#[test]
fn test_dialect_facts() {
    assert!(!SqlServer.can_relax_not_null(&Field::new("notes", "ntext", false)));
    assert!(Postgres.can_relax_not_null(&Field::new("notes", "text", false)));
    assert!(Oracle.uses_sequences() && Oracle.uses_triggers() && !Oracle.uses_identity());
    assert_eq!(DialectKind::SqlServer.dialect().name(), "sqlserver");
}

#[test]
fn test_identity_is_never_added_nullable_on_postgres() {
    let t = users();
    assert!(!Postgres.null_identity_supported());
    insta::assert_snapshot!(Postgres.add_field(&t, &t.fields[0]), @r#"ALTER TABLE "app"."users" ADD "id" integer GENERATED BY DEFAULT AS IDENTITY NOT NULL"#);
}
