use std::fs;

use flatdb::{Database, DbError, StatementOutput};
use tempfile::TempDir;

fn open_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().to_str().unwrap(), false).unwrap();
    (dir, db)
}

fn exec(db: &mut Database, sql: &str) -> StatementOutput {
    db.execute(sql).unwrap_or_else(|e| panic!("statement failed: {} ({})", sql, e))
}

fn rows(output: StatementOutput) -> Vec<Vec<String>> {
    match output {
        StatementOutput::Rows { rows, .. } => rows,
        other => panic!("expected rows, got {:?}", other),
    }
}

fn seed_users(db: &mut Database) {
    exec(db, "create table users ( name 20 age 3 )");
    exec(
        db,
        "insert into users values ( 'Alice' 30 'Bob' 25 'Carol' 35 )",
    );
}

#[test]
fn scenario_a_create_insert_select() {
    let (_dir, mut db) = open_db();
    exec(&mut db, "create table users ( name 20 age 3 )");
    let inserted = exec(&mut db, "insert into users values ( 'Alice' 30 'Bob' 25 )");
    assert_eq!(inserted, StatementOutput::Affected(2));

    let out = rows(exec(&mut db, "select * from users"));
    assert_eq!(out.len(), 2);
    assert_eq!(out[0], vec!["Alice", "30"]);
    assert_eq!(out[1], vec!["Bob", "25"]);
}

#[test]
fn scenario_b_where_filter() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let out = rows(exec(&mut db, "select name from users where age > 28"));
    assert_eq!(out, vec![vec!["Alice"], vec!["Carol"]]);
}

#[test]
fn scenario_c_numeric_order_by() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let out = rows(exec(&mut db, "select name from users order by age num"));
    assert_eq!(out, vec![vec!["Bob"], vec!["Alice"], vec!["Carol"]]);
}

#[test]
fn scenario_d_two_table_equi_join() {
    let (_dir, mut db) = open_db();
    exec(&mut db, "create table users ( name 20 dept_id 4 )");
    exec(&mut db, "create table depts ( id 4 dept_name 20 )");
    exec(&mut db, "insert into users values ( 'Alice' 1 'Bob' 2 )");
    exec(
        &mut db,
        "insert into depts values ( 1 'Engineering' 2 'Sales' )",
    );

    let mut out = rows(exec(
        &mut db,
        "select name dept_name from users depts where dept_id = id",
    ));
    out.sort();
    assert_eq!(
        out,
        vec![
            vec!["Alice".to_string(), "Engineering".to_string()],
            vec!["Bob".to_string(), "Sales".to_string()],
        ]
    );
}

#[test]
fn scenario_e_scalar_subquery() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let out = rows(exec(
        &mut db,
        "select name from users where age = select max(age) from users",
    ));
    assert_eq!(out, vec![vec!["Carol"]]);
}

#[test]
fn scenario_f_in_subquery() {
    let (_dir, mut db) = open_db();
    exec(&mut db, "create table users ( name 20 status 2 )");
    exec(&mut db, "create table valid ( code 2 )");
    exec(
        &mut db,
        "insert into users values ( 'Alice' A 'Bob' B 'Carol' C )",
    );
    exec(&mut db, "insert into valid values ( A B )");

    let out = rows(exec(
        &mut db,
        "select name from users where status in select code from valid",
    ));
    assert_eq!(out, vec![vec!["Alice"], vec!["Bob"]]);

    let out = rows(exec(
        &mut db,
        "select name from users where status not in select code from valid",
    ));
    assert_eq!(out, vec![vec!["Carol"]]);
}

// 属性2: 插入K*N个值后数据文件多K行, 每行N个字段
#[test]
fn insert_appends_exact_lines() {
    let (dir, mut db) = open_db();
    exec(&mut db, "create table t ( a 5 b 5 )");
    exec(&mut db, "insert into t values ( 1 2 3 4 5 6 )");
    let text = fs::read_to_string(dir.path().join("t~")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        assert_eq!(line.split('\t').count(), 2);
    }
}

#[test]
fn insert_wrong_value_count_is_rejected() {
    let (dir, mut db) = open_db();
    exec(&mut db, "create table t ( a 5 b 5 )");
    match db.execute("insert into t values ( 1 2 3 )") {
        Err(DbError::Arity(msg)) => assert_eq!(msg, "Incorrect number of values"),
        other => panic!("expected arity error, got {:?}", other),
    }
    // 出错的插入不留下任何行
    let text = fs::read_to_string(dir.path().join("t~")).unwrap();
    assert!(text.is_empty());
}

// 属性4: select * 的结果原样插回空表后数据文件逐字节一致
#[test]
fn select_insert_round_trip() {
    let (dir, mut db) = open_db();
    seed_users(&mut db);
    exec(&mut db, "create table copy ( name 20 age 3 )");

    let out = rows(exec(&mut db, "select * from users"));
    for row in out {
        let statement = format!(
            "insert into copy values ( '{}' '{}' )",
            row[0], row[1]
        );
        exec(&mut db, &statement);
    }
    let original = fs::read(dir.path().join("users~")).unwrap();
    let copied = fs::read(dir.path().join("copy~")).unwrap();
    assert_eq!(original, copied);
}

// 属性5: 删掉满足p的行之后按p计数为零
#[test]
fn delete_then_count_is_zero() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let removed = exec(&mut db, "delete from users where age > 28");
    assert_eq!(removed, StatementOutput::Affected(2));
    let out = rows(exec(
        &mut db,
        "select count(*) from users where age > 28",
    ));
    assert_eq!(out, vec![vec!["0"]]);
    let out = rows(exec(&mut db, "select name from users"));
    assert_eq!(out, vec![vec!["Bob"]]);
}

// 属性6: 非空数值列上 min <= avg <= max
#[test]
fn aggregate_bounds_hold() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let out = rows(exec(
        &mut db,
        "select min(age) avg(age) max(age) from users",
    ));
    let min: f64 = out[0][0].parse().unwrap();
    let avg: f64 = out[0][1].parse().unwrap();
    let max: f64 = out[0][2].parse().unwrap();
    assert!(min <= avg && avg <= max);
    assert_eq!(out[0][1], "30");
}

// 属性7: distinct的输出是集合
#[test]
fn distinct_produces_a_set() {
    let (_dir, mut db) = open_db();
    exec(&mut db, "create table t ( v 5 )");
    exec(&mut db, "insert into t values ( x x y x )");
    let out = rows(exec(&mut db, "select distinct v from t"));
    assert_eq!(out, vec![vec!["x"], vec!["y"]]);
}

// 属性8: 标量子查询等价于先算内层再代入
#[test]
fn scalar_subquery_substitution() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let inner = rows(exec(&mut db, "select max(age) from users"));
    let substituted = format!(
        "select name from users where age = {}",
        inner[0][0]
    );
    let direct = rows(exec(&mut db, &substituted));
    let nested = rows(exec(
        &mut db,
        "select name from users where age = select max(age) from users",
    ));
    assert_eq!(direct, nested);
}

#[test]
fn scalar_subquery_with_zero_rows_is_an_error() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let result = db.execute("select name from users where age = select age from users where name = 'Nobody'");
    assert!(matches!(result, Err(DbError::Subquery(_))));
}

// 子查询推迟到谓词第一次对行求值才执行:
// 外层表为空时坏的子查询根本不会跑, 语句正常完成
#[test]
fn subquery_is_not_run_when_outer_table_is_empty() {
    let (_dir, mut db) = open_db();
    exec(&mut db, "create table empty_t ( name 20 age 3 )");
    exec(&mut db, "create table t ( v 3 )");
    exec(&mut db, "insert into t values ( 1 2 )");

    // select v from t 返回两行, 作为标量子查询本应报错
    let removed = exec(&mut db, "delete from empty_t where age = select v from t");
    assert_eq!(removed, StatementOutput::Affected(0));
    let out = rows(exec(
        &mut db,
        "select name from empty_t where age = select v from t",
    ));
    assert!(out.is_empty());
    let touched = exec(&mut db, "update empty_t set age = 0 where age = select v from t");
    assert_eq!(touched, StatementOutput::Affected(0));

    // 同一个子查询在非空表上第一次求值就报错
    exec(&mut db, "insert into empty_t values ( 'Alice' 30 )");
    assert!(matches!(
        db.execute("select name from empty_t where age = select v from t"),
        Err(DbError::Subquery(_))
    ));
}

#[test]
fn join_without_usable_key_reports_order_error() {
    let (_dir, mut db) = open_db();
    exec(&mut db, "create table a ( x 3 )");
    exec(&mut db, "create table b ( y 3 )");
    exec(&mut db, "insert into a values ( 1 )");
    exec(&mut db, "insert into b values ( 1 )");
    match db.execute("select x from a b where x = 1") {
        Err(DbError::JoinOrder(msg)) => {
            assert_eq!(msg, "Join not found, try reordering tables");
        }
        other => panic!("expected join order error, got {:?}", other),
    }
}

#[test]
fn union_concatenates_and_dedups() {
    let (_dir, mut db) = open_db();
    exec(&mut db, "create table a ( v 3 )");
    exec(&mut db, "create table b ( w 3 )");
    exec(&mut db, "insert into a values ( x y )");
    exec(&mut db, "insert into b values ( y z )");
    let out = rows(exec(&mut db, "select v from a union select w from b"));
    assert_eq!(out, vec![vec!["x"], vec!["y"], vec!["z"]]);

    // 列数不一致的UNION被拒绝
    exec(&mut db, "create table c ( p 3 q 3 )");
    exec(&mut db, "insert into c values ( 1 2 )");
    assert!(matches!(
        db.execute("select v from a union select p q from c"),
        Err(DbError::Arity(_))
    ));
}

#[test]
fn update_rewrites_matching_rows() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let touched = exec(&mut db, "update users set age = 40 where name = 'Alice'");
    assert_eq!(touched, StatementOutput::Affected(1));
    let out = rows(exec(&mut db, "select age from users where name = 'Alice'"));
    assert_eq!(out, vec![vec!["40"]]);

    // 没有WHERE时更新全部行
    let touched = exec(&mut db, "update users set age = 0");
    assert_eq!(touched, StatementOutput::Affected(3));
}

#[test]
fn update_unknown_column_is_rejected() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    assert!(matches!(
        db.execute("update users set salary = 1"),
        Err(DbError::Arity(_))
    ));
}

#[test]
fn create_and_drop_table_lifecycle() {
    let (dir, mut db) = open_db();
    exec(&mut db, "create table t ( a 5 )");
    assert!(dir.path().join("t@").exists());
    assert!(dir.path().join("t~").exists());

    assert!(matches!(
        db.execute("create table t ( a 5 )"),
        Err(DbError::AlreadyExists(_))
    ));

    exec(&mut db, "drop table t");
    assert!(!dir.path().join("t@").exists());
    assert!(!dir.path().join("t~").exists());
    assert!(matches!(
        db.execute("drop table t"),
        Err(DbError::NotFound(_))
    ));
}

#[test]
fn view_expands_to_underlying_join() {
    let (dir, mut db) = open_db();
    exec(&mut db, "create table users ( name 20 dept_id 4 )");
    exec(&mut db, "create table depts ( id 4 dept_name 20 )");
    exec(&mut db, "insert into users values ( 'Alice' 1 'Bob' 2 )");
    exec(
        &mut db,
        "insert into depts values ( 1 'Engineering' 2 'Sales' )",
    );
    exec(&mut db, "create view staff ( users.dept_id = depts.id )");
    assert!(dir.path().join("staff!").exists());

    let mut out = rows(exec(&mut db, "select name dept_name from staff"));
    out.sort();
    assert_eq!(
        out,
        vec![
            vec!["Alice".to_string(), "Engineering".to_string()],
            vec!["Bob".to_string(), "Sales".to_string()],
        ]
    );

    // 视图上的WHERE叠加在展开后的连接之上
    let out = rows(exec(
        &mut db,
        "select name from staff where dept_name = 'Sales'",
    ));
    assert_eq!(out, vec![vec!["Bob"]]);

    exec(&mut db, "drop view staff");
    assert!(!dir.path().join("staff!").exists());
    assert!(matches!(
        db.execute("select name from staff"),
        Err(DbError::NotFound(_))
    ));
}

#[test]
fn create_view_requires_tables() {
    let (_dir, mut db) = open_db();
    assert!(matches!(
        db.execute("create view v ( a.x = b.y )"),
        Err(DbError::NotFound(_))
    ));
}

#[test]
fn three_table_join_runs_left_to_right() {
    let (_dir, mut db) = open_db();
    exec(&mut db, "create table a ( ka 3 va 5 )");
    exec(&mut db, "create table b ( kb 3 vb 5 )");
    exec(&mut db, "create table c ( kc 3 vc 5 )");
    exec(&mut db, "insert into a values ( 1 a1 2 a2 )");
    exec(&mut db, "insert into b values ( 1 b1 2 b2 )");
    exec(&mut db, "insert into c values ( 1 c1 )");
    let mut out = rows(exec(
        &mut db,
        "select va vb vc from a b c where ka = kb and kb = kc",
    ));
    out.sort();
    assert_eq!(
        out,
        vec![vec!["a1".to_string(), "b1".to_string(), "c1".to_string()]]
    );
}

#[test]
fn bareword_right_hand_side_is_a_literal() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let quoted = rows(exec(&mut db, "select age from users where name = 'Bob'"));
    let bare = rows(exec(&mut db, "select age from users where name = Bob"));
    assert_eq!(quoted, bare);
}

#[test]
fn where_boolean_combinations() {
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    let out = rows(exec(
        &mut db,
        "select name from users where age > 28 and not name = 'Carol' or name = 'Bob'",
    ));
    assert_eq!(out, vec![vec!["Alice"], vec!["Bob"]]);
}

#[test]
fn parse_errors_do_not_end_the_session() {
    let (_dir, mut db) = open_db();
    assert!(matches!(
        db.execute("select 'unterminated from t"),
        Err(DbError::Parse(_))
    ));
    assert!(matches!(
        db.execute("frobnicate the database"),
        Err(DbError::Parse(_))
    ));
    // 出错之后会话照常可用
    seed_users(&mut db);
    let out = rows(exec(&mut db, "select count(*) from users"));
    assert_eq!(out, vec![vec!["3"]]);
}

#[test]
fn missing_directory_is_a_config_error() {
    assert!(matches!(
        Database::open("/nonexistent/flatdb-test-dir", false),
        Err(DbError::Config(_))
    ));
}

#[test]
fn print_is_not_a_core_statement() {
    // print/help 由交互层在进SQL管线之前处理, 引擎只认SQL语句
    let (_dir, mut db) = open_db();
    seed_users(&mut db);
    assert!(matches!(
        db.execute("print users"),
        Err(DbError::Parse(_))
    ));
}
